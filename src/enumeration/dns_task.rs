//! Resolution stages: per-subdomain priming (root task) and the two
//! resolve-and-filter passes (initial and validation).

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::EnumConfig;
use crate::enumeration::name_src::NameSource;
use crate::filter::StringFilter;
use crate::pipeline::Stage;
use crate::requests::{
    BASIC_QUERY_TYPES, DNSAnswer, DNSRequest, INITIAL_QUERY_TYPES, RecordType, Tag,
};
use crate::resolve::Resolver;
use crate::wildcard::WildcardDetector;

/// Resolve the NS/MX/SOA/SPF bundle for a subdomain. Per-type failures are
/// logged and skipped.
pub(crate) async fn basic_queries(resolver: &dyn Resolver, name: &str) -> Vec<DNSAnswer> {
    let mut answers = Vec::new();
    for rrtype in BASIC_QUERY_TYPES {
        match resolver.resolve(name, rrtype).await {
            Ok(ans) => answers.extend(ans),
            Err(e) => debug!("basic query {rrtype} {name}: {e}"),
        }
    }
    answers
}

/// First pipeline stage: the first request seen for each (domain, name) pair
/// gets the basic-queries bundle. Bundle answers ride along on the request
/// and are also re-admitted so a never-seen subdomain enters the run.
pub struct RootTask {
    resolver: Arc<dyn Resolver>,
    name_src: Arc<NameSource>,
    /// First-writer-wins registration, shared with the subdomain task so a
    /// subdomain is primed at most once per run.
    registered: Arc<StringFilter>,
}

impl RootTask {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        name_src: Arc<NameSource>,
        registered: Arc<StringFilter>,
    ) -> Self {
        Self {
            resolver,
            name_src,
            registered,
        }
    }
}

#[async_trait]
impl Stage for RootTask {
    fn name(&self) -> &'static str {
        "root"
    }

    async fn process(&self, mut req: DNSRequest, _token: &CancellationToken) -> Option<DNSRequest> {
        if req.name.is_empty() || req.domain.is_empty() {
            return None;
        }
        if self
            .registered
            .duplicate(&format!("{}|{}", req.domain, req.name))
        {
            return Some(req);
        }

        let answers = basic_queries(self.resolver.as_ref(), &req.name).await;
        if !answers.is_empty() {
            let mut synth = DNSRequest::new(&req.name, &req.domain, Tag::Dns, "Forward DNS");
            synth.attach_records(answers.clone());
            self.name_src.new_name(synth);
            req.attach_records(answers);
        }
        Some(req)
    }
}

/// Resolve-and-filter stage. Constructed twice: once over the regular pool,
/// and once (`trusted`) over the trusted pool with wildcard detection for
/// the validation pass.
pub struct DnsTask {
    config: Arc<EnumConfig>,
    resolver: Arc<dyn Resolver>,
    trusted: bool,
    wildcard: Option<Arc<WildcardDetector>>,
}

impl DnsTask {
    pub fn new(
        config: Arc<EnumConfig>,
        resolver: Arc<dyn Resolver>,
        trusted: bool,
        wildcard: Option<Arc<WildcardDetector>>,
    ) -> Self {
        Self {
            config,
            resolver,
            trusted,
            wildcard,
        }
    }

    /// Reject the whole answer set of one query when any A record falls in a
    /// bad subnet.
    fn good_records(&self, answers: &[DNSAnswer]) -> bool {
        !answers.iter().any(|a| {
            a.rrtype == RecordType::A.to_u16()
                && a.data
                    .parse()
                    .map(|ip| self.config.bad_address(&ip))
                    .unwrap_or(false)
        })
    }
}

#[async_trait]
impl Stage for DnsTask {
    fn name(&self) -> &'static str {
        if self.trusted { "validate" } else { "dns" }
    }

    async fn process(&self, mut req: DNSRequest, _token: &CancellationToken) -> Option<DNSRequest> {
        if req.name.is_empty() || req.domain.is_empty() {
            return None;
        }
        if self.config.blacklisted(&req.name) {
            return None;
        }

        let mut answers = Vec::new();
        for rrtype in INITIAL_QUERY_TYPES {
            match self.resolver.resolve(&req.name, rrtype).await {
                Ok(ans) => {
                    let got_answer = !ans.is_empty();
                    if self.good_records(&ans) {
                        answers.extend(ans);
                    } else {
                        debug!("{}: {rrtype} answers hit the bad-subnet list", req.name);
                    }
                    // CNAME chains are the resolver's job; skip the address
                    // types once one is seen.
                    if rrtype == RecordType::CNAME && got_answer {
                        break;
                    }
                }
                Err(e) => debug!("resolve {rrtype} {}: {e}", req.name),
            }
        }
        req.attach_records(answers);

        if req.records.is_empty() {
            if self.config.include_unresolvable && self.config.is_domain_in_scope(&req.name) {
                return Some(req);
            }
            return None;
        }

        if self.trusted && !self.config.trusted_tag(req.tag) {
            if let Some(wildcard) = &self.wildcard {
                if wildcard.matches(&req).await {
                    debug!("{} matches the wildcard fingerprint of its zone", req.name);
                    return None;
                }
            }
        }

        Some(req)
    }
}
