//! The enumeration driver: wires the name source, resolution stages, data
//! manager, subdomain task, and source dispatcher into one run.

pub mod dispatcher;
pub mod dns_task;
pub mod name_src;
pub mod store;
pub mod subdomains;

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EnumConfig;
use crate::datasrcs::DataSource;
use crate::error::Result;
use crate::filter::StringFilter;
use crate::graph::Graph;
use crate::pipeline::{OutputSink, Pipeline, Stage};
use crate::requests::{DNSRequest, SourceRequest, Tag};
use crate::resolve::Resolver;
use crate::wildcard::WildcardDetector;

pub use dispatcher::Dispatcher;
pub use dns_task::{DnsTask, RootTask};
pub use name_src::NameSource;
pub use store::DataManager;
pub use subdomains::SubdomainTask;

/// One DNS enumeration run over a set of root domains.
pub struct Enumeration {
    config: Arc<EnumConfig>,
    resolver: Arc<dyn Resolver>,
    trusted_resolver: Arc<dyn Resolver>,
    graph: Arc<dyn Graph>,
    sources: Vec<DataSource>,
}

impl Enumeration {
    pub fn new(
        config: EnumConfig,
        resolver: Arc<dyn Resolver>,
        trusted_resolver: Arc<dyn Resolver>,
        graph: Arc<dyn Graph>,
        sources: Vec<DataSource>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            trusted_resolver,
            graph,
            sources,
        }
    }

    pub fn config(&self) -> &EnumConfig {
        &self.config
    }

    /// Run to quiescence or cancellation. Returns `EnumError::Cancelled`
    /// when the token fires first; data stored before the cancellation is
    /// kept either way.
    pub async fn start(&self, token: CancellationToken) -> Result<()> {
        let mut config = (*self.config).clone();
        config.check_settings()?;
        let config = Arc::new(config);

        let run = token.child_token();
        let dispatcher = Dispatcher::new(self.sources.clone(), run.clone());

        let in_flight = Arc::new(AtomicUsize::new(0));
        let store_outstanding = Arc::new(AtomicUsize::new(0));
        let name_src = Arc::new(NameSource::new(
            config.clone(),
            in_flight.clone(),
            dispatcher.busy_gauge(),
            store_outstanding.clone(),
        ));

        let mut stages: Vec<Arc<dyn Stage>> = Vec::new();
        let mut store = None;
        if !config.passive {
            let registered = Arc::new(StringFilter::new());
            let subdomains = Arc::new(SubdomainTask::new(
                config.clone(),
                self.resolver.clone(),
                name_src.clone(),
                registered.clone(),
            ));
            let manager = Arc::new(DataManager::new(
                config.clone(),
                self.graph.clone(),
                name_src.clone(),
                subdomains.clone(),
                store_outstanding.clone(),
            ));
            let wildcard = Arc::new(WildcardDetector::new(self.trusted_resolver.clone()));

            stages.push(Arc::new(RootTask::new(
                self.trusted_resolver.clone(),
                name_src.clone(),
                registered,
            )));
            stages.push(Arc::new(DnsTask::new(
                config.clone(),
                self.resolver.clone(),
                false,
                None,
            )));
            stages.push(Arc::new(DnsTask::new(
                config.clone(),
                self.trusted_resolver.clone(),
                true,
                Some(wildcard),
            )));
            stages.push(manager.clone());
            stages.push(subdomains);
            store = Some(manager);
        }

        info!(
            "starting enumeration {} over {} domain(s)",
            config.uuid,
            config.domains.len()
        );
        self.submit_domains(&config, &name_src, &dispatcher);
        self.submit_asns(&config, &dispatcher);
        self.spawn_known_name_submission(&config, &name_src, &run);
        self.spawn_provided_name_submission(&config, &name_src, &run);

        let sink = Arc::new(EnumSink {
            config: config.clone(),
            graph: self.graph.clone(),
        });
        let pipeline = Pipeline::new(stages, in_flight);
        let result = if config.passive {
            pipeline.execute(run.clone(), name_src.clone(), sink).await
        } else {
            pipeline
                .execute_buffered(run.clone(), name_src.clone(), sink, config.pipeline_buffer)
                .await
        };

        // Drain before declaring the run complete, then tear down the
        // dispatcher and any source still waiting on input.
        if let Some(store) = store {
            store.stop().await;
        }
        name_src.stop();
        run.cancel();

        match &result {
            Ok(()) => info!("enumeration {} completed", config.uuid),
            Err(e) => warn!("enumeration {} ended early: {e}", config.uuid),
        }
        result
    }

    /// Roots seed both the pipeline and every data source.
    fn submit_domains(
        &self,
        config: &EnumConfig,
        name_src: &NameSource,
        dispatcher: &Dispatcher,
    ) {
        for domain in &config.domains {
            let req = DNSRequest::new(domain, domain, Tag::Dns, "DNS");
            name_src.new_name(req.clone());
            dispatcher.send(SourceRequest::Dns(req));
        }
    }

    /// ASN seeds only ever reach the data sources.
    fn submit_asns(&self, config: &EnumConfig, dispatcher: &Dispatcher) {
        for asn in &config.asns {
            dispatcher.send(SourceRequest::Asn(crate::requests::ASNRequest { asn: *asn }));
        }
    }

    /// Names persisted by earlier runs re-enter this one, tagged with the
    /// origin class their source declares.
    fn spawn_known_name_submission(
        &self,
        config: &Arc<EnumConfig>,
        name_src: &Arc<NameSource>,
        run: &CancellationToken,
    ) {
        let graph = self.graph.clone();
        let config = config.clone();
        let name_src = name_src.clone();
        let run = run.clone();
        let source_tags: Vec<(String, String)> = self
            .sources
            .iter()
            .map(|s| (s.name().to_string(), s.description().to_string()))
            .collect();

        tokio::spawn(async move {
            for event in graph.events_in_scope(&config.domains).await {
                for name in graph.event_fqdns(&event).await {
                    if run.is_cancelled() {
                        return;
                    }
                    let Some(domain) = config.which_domain(&name) else {
                        continue;
                    };
                    match graph.node_sources(&name, &event).await {
                        Ok(sources) if !sources.is_empty() => {
                            let source = &sources[0];
                            let tag = source_tags
                                .iter()
                                .find(|(n, _)| n == source)
                                .and_then(|(_, d)| Tag::from_str(d).ok())
                                .unwrap_or(Tag::None);
                            name_src.new_name(DNSRequest::new(&name, domain, tag, source));
                        }
                        Ok(_) => {}
                        Err(e) => debug!("known name {name}: {e}"),
                    }
                }
            }
        });
    }

    fn spawn_provided_name_submission(
        &self,
        config: &Arc<EnumConfig>,
        name_src: &Arc<NameSource>,
        run: &CancellationToken,
    ) {
        let config = config.clone();
        let name_src = name_src.clone();
        let run = run.clone();

        tokio::spawn(async move {
            for name in &config.provided_names {
                if run.is_cancelled() {
                    return;
                }
                if let Some(domain) = config.which_domain(name) {
                    name_src.new_name(DNSRequest::new(
                        name,
                        domain,
                        Tag::External,
                        "User Input",
                    ));
                }
            }
        });
    }
}

/// End of the chain. Passive runs persist here because no data manager ran;
/// otherwise the sink only closes the loop.
struct EnumSink {
    config: Arc<EnumConfig>,
    graph: Arc<dyn Graph>,
}

#[async_trait]
impl OutputSink for EnumSink {
    async fn accept(&self, req: DNSRequest) {
        if !self.config.passive {
            return;
        }
        if req.name.is_empty() || !self.config.is_domain_in_scope(&req.name) {
            return;
        }
        if let Err(e) = self
            .graph
            .upsert_fqdn(&req.name, &req.source, &self.config.uuid)
            .await
        {
            warn!("output sink: {e}");
        }
    }
}
