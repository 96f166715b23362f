//! The graph store contract and an in-memory implementation.
//!
//! Facts are nodes (FQDN, address, netblock, ASN) with `(source, event)`
//! labels; upserts are idempotent for the same triple, so re-running an
//! enumeration against the same event converges to the same graph.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeSet;

use crate::error::{EnumError, Result};
use crate::names;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Fqdn,
    IpAddress,
    Netblock,
    Asn,
}

/// Relationship labels between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    ARecord,
    AaaaRecord,
    CnameRecord,
    NsRecord,
    MxRecord,
    SoaRecord,
    SrvRecord,
    PtrRecord,
}

#[async_trait]
pub trait Graph: Send + Sync {
    /// Upsert a FQDN node labelled by the discovering source; returns the
    /// node id.
    async fn upsert_fqdn(&self, name: &str, source: &str, event: &str) -> Result<String>;

    /// Upsert an edge from a FQDN to a record target, creating both nodes.
    /// Address targets become IPAddress nodes, everything else FQDN nodes.
    async fn upsert_record(
        &self,
        fqdn: &str,
        target: &str,
        kind: EdgeKind,
        source: &str,
        event: &str,
    ) -> Result<()>;

    /// Events that stored at least one FQDN under the given domains.
    async fn events_in_scope(&self, domains: &[String]) -> Vec<String>;

    /// All FQDN node ids labelled with the event.
    async fn event_fqdns(&self, event: &str) -> Vec<String>;

    /// Sources that labelled a node within an event.
    async fn node_sources(&self, node: &str, event: &str) -> Result<Vec<String>>;
}

/// DashMap-backed graph used by the CLI and the tests.
#[derive(Debug, Default)]
pub struct MemGraph {
    nodes: DashMap<String, NodeKind>,
    /// node id -> set of (source, event) labels.
    labels: DashMap<String, BTreeSet<(String, String)>>,
    edges: DashSet<(String, String, EdgeKind, String, String)>,
}

impl MemGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn label(&self, node: &str, kind: NodeKind, source: &str, event: &str) {
        self.nodes.entry(node.to_string()).or_insert(kind);
        self.labels
            .entry(node.to_string())
            .or_default()
            .insert((source.to_string(), event.to_string()));
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, from: &str, to: &str, kind: EdgeKind) -> bool {
        self.edges
            .iter()
            .any(|e| e.0 == from && e.1 == to && e.2 == kind)
    }
}

#[async_trait]
impl Graph for MemGraph {
    async fn upsert_fqdn(&self, name: &str, source: &str, event: &str) -> Result<String> {
        let id = name.to_lowercase();
        if id.is_empty() {
            return Err(EnumError::Graph("empty FQDN".into()));
        }
        self.label(&id, NodeKind::Fqdn, source, event);
        Ok(id)
    }

    async fn upsert_record(
        &self,
        fqdn: &str,
        target: &str,
        kind: EdgeKind,
        source: &str,
        event: &str,
    ) -> Result<()> {
        let from = self.upsert_fqdn(fqdn, source, event).await?;
        let to = target.to_lowercase();
        if to.is_empty() {
            return Err(EnumError::Graph(format!("empty target for {from}")));
        }

        let target_kind = match kind {
            EdgeKind::ARecord | EdgeKind::AaaaRecord => NodeKind::IpAddress,
            _ => NodeKind::Fqdn,
        };
        self.label(&to, target_kind, source, event);
        self.edges
            .insert((from, to, kind, source.to_string(), event.to_string()));
        Ok(())
    }

    async fn events_in_scope(&self, domains: &[String]) -> Vec<String> {
        let mut events = BTreeSet::new();
        for entry in self.labels.iter() {
            let in_scope = matches!(self.nodes.get(entry.key()).map(|k| *k), Some(NodeKind::Fqdn))
                && domains.iter().any(|d| names::is_subdomain(entry.key(), d));
            if in_scope {
                events.extend(entry.value().iter().map(|(_, e)| e.clone()));
            }
        }
        events.into_iter().collect()
    }

    async fn event_fqdns(&self, event: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .labels
            .iter()
            .filter(|entry| {
                matches!(self.nodes.get(entry.key()).map(|k| *k), Some(NodeKind::Fqdn))
                    && entry.value().iter().any(|(_, e)| e == event)
            })
            .map(|entry| entry.key().clone())
            .collect();
        out.sort();
        out
    }

    async fn node_sources(&self, node: &str, event: &str) -> Result<Vec<String>> {
        let entry = self
            .labels
            .get(&node.to_lowercase())
            .ok_or_else(|| EnumError::Graph(format!("unknown node: {node}")))?;
        let sources: BTreeSet<String> = entry
            .value()
            .iter()
            .filter(|(_, e)| e == event)
            .map(|(s, _)| s.clone())
            .collect();
        if sources.is_empty() {
            return Err(EnumError::Graph(format!("{node} not in event {event}")));
        }
        Ok(sources.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upserts_are_idempotent() {
        let graph = MemGraph::new();
        for _ in 0..3 {
            graph.upsert_fqdn("www.example.com", "DNS", "ev1").await.unwrap();
            graph
                .upsert_record("www.example.com", "192.0.2.1", EdgeKind::ARecord, "DNS", "ev1")
                .await
                .unwrap();
        }
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(
            graph.node_sources("www.example.com", "ev1").await.unwrap(),
            vec!["DNS".to_string()]
        );
    }

    #[tokio::test]
    async fn test_event_queries() {
        let graph = MemGraph::new();
        graph.upsert_fqdn("www.example.com", "DNS", "ev1").await.unwrap();
        graph.upsert_fqdn("api.example.com", "Cert", "ev2").await.unwrap();

        let domains = vec!["example.com".to_string()];
        let mut events = graph.events_in_scope(&domains).await;
        events.sort();
        assert_eq!(events, vec!["ev1".to_string(), "ev2".to_string()]);
        assert_eq!(graph.event_fqdns("ev1").await, vec!["www.example.com".to_string()]);
    }
}
