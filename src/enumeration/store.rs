//! The data manager: persists validated requests into the graph and derives
//! new candidates from the stored answers.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EnumConfig;
use crate::enumeration::name_src::NameSource;
use crate::enumeration::subdomains::SubdomainTask;
use crate::graph::{EdgeKind, Graph};
use crate::names;
use crate::pipeline::Stage;
use crate::requests::{DNSRequest, RecordType, Tag};

pub struct DataManager {
    config: Arc<EnumConfig>,
    graph: Arc<dyn Graph>,
    name_src: Arc<NameSource>,
    subdomains: Arc<SubdomainTask>,
    outstanding: Arc<AtomicUsize>,
    settled: Notify,
}

impl DataManager {
    pub fn new(
        config: Arc<EnumConfig>,
        graph: Arc<dyn Graph>,
        name_src: Arc<NameSource>,
        subdomains: Arc<SubdomainTask>,
        outstanding: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            config,
            graph,
            name_src,
            subdomains,
            outstanding,
            settled: Notify::new(),
        }
    }

    /// Resolves once every upsert that has entered this stage has completed
    /// or been abandoned. The runtime awaits this before declaring the run
    /// finished.
    pub async fn stop(&self) {
        loop {
            // Register before sampling the gauge so a decrement between the
            // two cannot be missed.
            let mut settled = std::pin::pin!(self.settled.notified());
            settled.as_mut().enable();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            settled.await;
        }
    }

    async fn persist(&self, req: &DNSRequest) {
        let event = &self.config.uuid;
        if let Err(e) = self.graph.upsert_fqdn(&req.name, &req.source, event).await {
            warn!("abandoning {}: {e}", req.name);
            return;
        }

        for record in &req.records {
            let kind = match RecordType::from_u16(record.rrtype) {
                Some(RecordType::A) => EdgeKind::ARecord,
                Some(RecordType::AAAA) => EdgeKind::AaaaRecord,
                Some(RecordType::CNAME) => EdgeKind::CnameRecord,
                Some(RecordType::NS) => EdgeKind::NsRecord,
                Some(RecordType::MX) => EdgeKind::MxRecord,
                Some(RecordType::SOA) => EdgeKind::SoaRecord,
                Some(RecordType::SRV) => EdgeKind::SrvRecord,
                Some(RecordType::PTR) => EdgeKind::PtrRecord,
                _ => continue,
            };
            if let Err(e) = self
                .graph
                .upsert_record(&req.name, &record.data, kind, &req.source, event)
                .await
            {
                warn!("abandoning {} record of {}: {e}", record.rrtype, req.name);
            }
        }
    }

    /// Emit follow-up work: in-scope record targets re-enter the name
    /// source, and each address gets its surrounding netblock swept.
    async fn derive(&self, req: &DNSRequest, token: &CancellationToken) {
        for record in &req.records {
            let is_addr = record.rrtype == RecordType::A.to_u16()
                || record.rrtype == RecordType::AAAA.to_u16();
            if is_addr {
                if let Ok(addr) = record.data.parse() {
                    self.subdomains.reverse_sweep(addr, token).await;
                }
                continue;
            }

            let Some(target) = names::normalize_fqdn(&record.data) else {
                continue;
            };
            if let Some(domain) = self.config.which_domain(&target) {
                self.name_src.new_name(DNSRequest::new(
                    &target,
                    domain,
                    Tag::Dns,
                    &req.source,
                ));
            } else {
                debug!("derived target out of scope: {target}");
            }
        }
    }
}

#[async_trait]
impl Stage for DataManager {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn process(&self, req: DNSRequest, token: &CancellationToken) -> Option<DNSRequest> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);

        // Persistence always runs to completion, even under cancellation;
        // only the derived sweeps are abandoned early.
        self.persist(&req).await;
        if !token.is_cancelled() {
            self.derive(&req, token).await;
        }

        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.settled.notify_waiters();
        Some(req)
    }
}
