//! Wildcard zone detection for the validation stage.
//!
//! A zone that answers every label with the same address set poisons
//! enumeration with false positives. Each zone is probed once per run with
//! random labels; requests whose address records match the cached
//! fingerprint are rejected upstream.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::names;
use crate::requests::{DNSRequest, RecordType};
use crate::resolve::Resolver;

/// Random labels resolved under a zone before classifying it.
const NUM_PROBES: usize = 3;

#[derive(Debug, Clone, Default)]
struct WildcardEntry {
    dynamic: bool,
    /// Address answers every probed label collapsed to.
    fingerprint: BTreeSet<String>,
}

/// Lazily-populated per-zone wildcard cache. Concurrent checks of the same
/// zone coalesce to a single probe.
pub struct WildcardDetector {
    resolver: Arc<dyn Resolver>,
    zones: DashMap<String, Arc<OnceCell<WildcardEntry>>>,
}

impl WildcardDetector {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            zones: DashMap::new(),
        }
    }

    /// Whether the request's address records match its zone's wildcard
    /// fingerprint. The zone is the name's immediate parent, down to the
    /// root domain itself. Trusted-tag bypass is the caller's decision.
    pub async fn matches(&self, req: &DNSRequest) -> bool {
        let Some((_, zone)) = req.name.split_once('.') else {
            return false;
        };
        if !names::is_subdomain(zone, &req.domain) {
            return false;
        }

        let entry = self.zone_entry(zone).await;
        if !entry.dynamic {
            return false;
        }

        let addrs: BTreeSet<String> = req
            .addresses()
            .iter()
            .map(|a| a.to_string())
            .collect();
        !addrs.is_empty() && addrs == entry.fingerprint
    }

    async fn zone_entry(&self, zone: &str) -> WildcardEntry {
        let cell = self
            .zones
            .entry(zone.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_init(|| self.probe_zone(zone.to_string()))
            .await
            .clone()
    }

    /// Resolve random labels under the zone; identical non-empty address
    /// sets classify it as a dynamic wildcard.
    async fn probe_zone(&self, zone: String) -> WildcardEntry {
        let mut sets: Vec<BTreeSet<String>> = Vec::with_capacity(NUM_PROBES);

        for _ in 0..NUM_PROBES {
            let name = format!("{}.{}", names::random_label(), zone);
            let mut addrs = BTreeSet::new();
            for rrtype in [RecordType::A, RecordType::AAAA] {
                match self.resolver.resolve(&name, rrtype).await {
                    Ok(answers) => {
                        addrs.extend(answers.into_iter().map(|a| a.data));
                    }
                    Err(e) => debug!("wildcard probe {name}: {e}"),
                }
            }
            sets.push(addrs);
        }

        let first = &sets[0];
        let dynamic = !first.is_empty() && sets.iter().all(|s| s == first);
        if dynamic {
            info!("dynamic wildcard zone detected: {zone}");
        }

        WildcardEntry {
            dynamic,
            fingerprint: if dynamic { first.clone() } else { BTreeSet::new() },
        }
    }
}
