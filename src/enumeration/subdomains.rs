//! Subdomain expansion: the first FQDN seen under a new subdomain triggers
//! the priming bundle, SRV probing, and (in active mode) zone-transfer
//! attempts. Also runs the reverse sweeps scheduled by the data manager.

use async_trait::async_trait;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::EnumConfig;
use crate::enumeration::dns_task::basic_queries;
use crate::enumeration::name_src::NameSource;
use crate::filter::StringFilter;
use crate::names;
use crate::pipeline::Stage;
use crate::requests::{DNSAnswer, DNSRequest, RecordType, Tag};
use crate::resolve::Resolver;

/// Service labels probed under every newly discovered subdomain.
pub const POPULAR_SRV_NAMES: [&str; 36] = [
    "_autodiscover._tcp",
    "_caldav._tcp",
    "_caldavs._tcp",
    "_carddav._tcp",
    "_carddavs._tcp",
    "_ftp._tcp",
    "_h323cs._tcp",
    "_h323ls._udp",
    "_imap._tcp",
    "_imaps._tcp",
    "_jabber._tcp",
    "_kerberos._tcp",
    "_kerberos._udp",
    "_kpasswd._tcp",
    "_ldap._tcp",
    "_matrix._tcp",
    "_minecraft._tcp",
    "_mysqlsrv._tcp",
    "_ntp._udp",
    "_pop3._tcp",
    "_pop3s._tcp",
    "_sip._tcp",
    "_sip._udp",
    "_sips._tcp",
    "_smtp._tcp",
    "_ssh._tcp",
    "_stun._tcp",
    "_stun._udp",
    "_submission._tcp",
    "_telnet._tcp",
    "_turn._tcp",
    "_turn._udp",
    "_vlmcs._tcp",
    "_xmpp-client._tcp",
    "_xmpp-server._tcp",
    "_imap._tls",
];

pub struct SubdomainTask {
    config: Arc<EnumConfig>,
    resolver: Arc<dyn Resolver>,
    name_src: Arc<NameSource>,
    /// Distinct-FQDN count per subdomain; the 0 -> 1 transition triggers
    /// expansion exactly once.
    counters: DashMap<String, u64>,
    /// Shared with the root task so the priming bundle runs once per
    /// (domain, name) pair.
    registered: Arc<StringFilter>,
    srv_filter: StringFilter,
    xfr_filter: StringFilter,
    sweep_filter: StringFilter,
}

impl SubdomainTask {
    pub fn new(
        config: Arc<EnumConfig>,
        resolver: Arc<dyn Resolver>,
        name_src: Arc<NameSource>,
        registered: Arc<StringFilter>,
    ) -> Self {
        Self {
            config,
            resolver,
            name_src,
            counters: DashMap::new(),
            registered,
            srv_filter: StringFilter::new(),
            xfr_filter: StringFilter::new(),
            sweep_filter: StringFilter::new(),
        }
    }

    /// Count one FQDN toward its subdomain; true only for the first.
    fn first_occurrence(&self, sub: &str) -> bool {
        let mut entry = self.counters.entry(sub.to_string()).or_insert(0);
        *entry += 1;
        *entry == 1
    }

    async fn expand(&self, sub: &str, domain: &str, token: &CancellationToken) {
        info!("new subdomain discovered: {sub}");

        if !self
            .registered
            .duplicate(&format!("{domain}|{sub}"))
        {
            let answers = basic_queries(self.resolver.as_ref(), sub).await;
            if !answers.is_empty() {
                if self.config.active {
                    self.attempt_zone_transfers(sub, domain, &answers).await;
                }
                let mut synth = DNSRequest::new(sub, domain, Tag::Dns, "Forward DNS");
                synth.attach_records(answers);
                self.name_src.new_name(synth);
            }
        } else if self.config.active {
            // Primed upstream; the NS answers are still needed for the
            // transfer attempts.
            match self.resolver.resolve(sub, RecordType::NS).await {
                Ok(answers) => self.attempt_zone_transfers(sub, domain, &answers).await,
                Err(e) => debug!("NS {sub}: {e}"),
            }
        }

        self.query_service_names(sub, domain, token).await;
    }

    /// Probe the SRV catalogue under the subdomain; answers re-enter the
    /// name source.
    async fn query_service_names(&self, sub: &str, domain: &str, token: &CancellationToken) {
        for service in POPULAR_SRV_NAMES {
            if token.is_cancelled() {
                return;
            }
            let srv_name = format!("{service}.{sub}");
            if self.srv_filter.duplicate(&srv_name) {
                continue;
            }
            match self.resolver.resolve(&srv_name, RecordType::SRV).await {
                Ok(answers) if !answers.is_empty() => {
                    let mut req = DNSRequest::new(&srv_name, domain, Tag::Dns, "Forward DNS");
                    req.attach_records(answers);
                    self.name_src.new_name(req);
                }
                Ok(_) => {}
                Err(e) => debug!("SRV {srv_name}: {e}"),
            }
        }
    }

    /// One AXFR attempt per (subdomain, server) pair, against the NS answers
    /// from the priming bundle.
    async fn attempt_zone_transfers(&self, sub: &str, domain: &str, answers: &[DNSAnswer]) {
        for answer in answers {
            if answer.rrtype != RecordType::NS.to_u16() {
                continue;
            }
            let server = &answer.data;
            if self.xfr_filter.duplicate(&format!("{sub}{server}")) {
                continue;
            }
            match self.resolver.zone_transfer(sub, domain, server).await {
                Ok(requests) => {
                    info!("zone transfer of {sub} from {server} yielded {} names", requests.len());
                    for req in requests {
                        self.name_src.new_name(req);
                    }
                }
                Err(e) => debug!("zone transfer {sub} @{server}: {e}"),
            }
        }
    }

    /// Reverse-resolve the netblock around a discovered address. PTR hits
    /// whose targets are in scope re-enter the name source.
    pub async fn reverse_sweep(&self, addr: IpAddr, token: &CancellationToken) {
        let Some(net) = names::sweep_net(addr, self.config.active) else {
            return;
        };
        for ip in names::sweep_addrs(&net) {
            if token.is_cancelled() {
                return;
            }
            if self.sweep_filter.duplicate(&ip.to_string()) {
                continue;
            }
            let Ok((ptr, target)) = self.resolver.reverse(ip).await else {
                continue;
            };
            let Some(domain) = self.config.which_domain(&target) else {
                continue;
            };
            let mut req = DNSRequest::new(&ptr, domain, Tag::Dns, "Reverse DNS");
            req.attach_records(vec![DNSAnswer {
                name: ptr.clone(),
                rrtype: RecordType::PTR.to_u16(),
                ttl: 0,
                data: target,
            }]);
            self.name_src.new_name(req);
        }
    }
}

#[async_trait]
impl Stage for SubdomainTask {
    fn name(&self) -> &'static str {
        "subdomains"
    }

    async fn process(&self, req: DNSRequest, token: &CancellationToken) -> Option<DNSRequest> {
        let Some(sub) = names::parent_subdomain(&req.name, &req.domain) else {
            return Some(req);
        };
        if self.first_occurrence(&sub) {
            self.expand(&sub, &req.domain, token).await;
        }
        Some(req)
    }
}
