use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::error::{EnumError, Result};
use crate::names;
use crate::requests::Tag;

/// Subnets whose A records mark an answer set as poisoned. These ranges are
/// sinkholes that some resolvers substitute for NXDOMAIN.
pub const DEFAULT_BAD_SUBNETS: [&str; 3] = [
    "198.105.244.0/24",
    "198.105.254.0/24",
    "88.204.137.0/24",
];

/// Resolvers used for the validation pass.
pub const DEFAULT_TRUSTED_RESOLVERS: [&str; 2] = ["8.8.8.8:53", "1.1.1.1:53"];

/// Options for a single enumeration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumConfig {
    /// Identifier grouping all facts persisted by this run.
    pub uuid: String,

    /// In-scope root domains.
    pub domains: Vec<String>,

    /// ASNs handed to ASN-aware data sources.
    pub asns: Vec<i32>,

    /// Names supplied by the user, admitted alongside discovered ones.
    pub provided_names: Vec<String>,

    /// Names (and subtrees) that must never be resolved.
    pub blacklist: Vec<String>,

    /// Skip the resolution stages entirely; seeds flow straight to output.
    pub passive: bool,

    /// Enable zone transfers and wider reverse sweeps.
    pub active: bool,

    /// Forward in-scope names downstream even when they fail to resolve.
    pub include_unresolvable: bool,

    /// Tags whose provenance permits bypassing wildcard filtering.
    pub trusted_tags: Vec<Tag>,

    /// CIDR blocklist applied to A answers.
    pub bad_subnets: Vec<IpNet>,

    /// Per-stage in-flight window in buffered mode.
    pub pipeline_buffer: usize,

    /// Worker threads for the Tokio runtime (0 = default).
    pub worker_threads: usize,

    /// Resolvers for the initial resolution pass (empty = system defaults).
    pub resolvers: Vec<SocketAddr>,

    /// Resolvers for the validation pass.
    pub trusted_resolvers: Vec<SocketAddr>,
}

impl Default for EnumConfig {
    fn default() -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            domains: Vec::new(),
            asns: Vec::new(),
            provided_names: Vec::new(),
            blacklist: Vec::new(),
            passive: false,
            active: false,
            include_unresolvable: false,
            trusted_tags: vec![Tag::Cert, Tag::Dns, Tag::Axfr],
            bad_subnets: DEFAULT_BAD_SUBNETS
                .iter()
                .map(|s| s.parse().expect("default bad subnet is valid"))
                .collect(),
            pipeline_buffer: 50,
            worker_threads: 0,
            resolvers: Vec::new(),
            trusted_resolvers: DEFAULT_TRUSTED_RESOLVERS
                .iter()
                .map(|s| s.parse().expect("default trusted resolver is valid"))
                .collect(),
        }
    }
}

impl EnumConfig {
    /// Defaults overridden by `MUNINN_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("MUNINN_PASSIVE") {
            config.passive = parse_bool(&v, config.passive);
        }
        if let Ok(v) = std::env::var("MUNINN_ACTIVE") {
            config.active = parse_bool(&v, config.active);
        }
        if let Ok(v) = std::env::var("MUNINN_INCLUDE_UNRESOLVABLE") {
            config.include_unresolvable = parse_bool(&v, config.include_unresolvable);
        }
        if let Ok(v) = std::env::var("MUNINN_DOMAINS") {
            config.domains = split_list(&v);
        }
        if let Ok(v) = std::env::var("MUNINN_BLACKLIST") {
            config.blacklist = split_list(&v);
        }
        if let Ok(v) = std::env::var("MUNINN_RESOLVERS") {
            config.resolvers = split_list(&v).iter().filter_map(|s| s.parse().ok()).collect();
        }
        if let Ok(v) = std::env::var("MUNINN_TRUSTED_RESOLVERS") {
            let servers: Vec<SocketAddr> =
                split_list(&v).iter().filter_map(|s| s.parse().ok()).collect();
            if !servers.is_empty() {
                config.trusted_resolvers = servers;
            }
        }
        if let Ok(v) = std::env::var("MUNINN_WORKER_THREADS") {
            config.worker_threads = v.parse().unwrap_or(config.worker_threads);
        }
        if let Ok(v) = std::env::var("MUNINN_PIPELINE_BUFFER") {
            config.pipeline_buffer = v.parse().unwrap_or(config.pipeline_buffer);
        }

        config
    }

    /// Fatal validation performed before a run starts.
    pub fn check_settings(&mut self) -> Result<()> {
        if self.passive && self.active {
            return Err(EnumError::Config(
                "passive and active modes are mutually exclusive".into(),
            ));
        }
        if self.pipeline_buffer == 0 {
            return Err(EnumError::Config("pipeline buffer must be non-zero".into()));
        }

        let mut domains = Vec::new();
        for domain in &self.domains {
            match names::normalize_fqdn(domain) {
                Some(d) if !domains.contains(&d) => domains.push(d),
                Some(_) => {}
                None => {
                    return Err(EnumError::Config(format!("invalid root domain: {domain}")));
                }
            }
        }
        if domains.is_empty() {
            return Err(EnumError::Config("no root domains provided".into()));
        }
        self.domains = domains;
        Ok(())
    }

    /// Whether the name falls under any configured root.
    pub fn is_domain_in_scope(&self, name: &str) -> bool {
        self.which_domain(name).is_some()
    }

    /// The root domain a name belongs to, preferring the longest match.
    pub fn which_domain(&self, name: &str) -> Option<&str> {
        self.domains
            .iter()
            .filter(|d| names::is_subdomain(name, d))
            .max_by_key(|d| d.len())
            .map(|d| d.as_str())
    }

    /// Whether the name sits inside a blacklisted subtree.
    pub fn blacklisted(&self, name: &str) -> bool {
        self.blacklist.iter().any(|b| names::is_subdomain(name, b))
    }

    pub fn trusted_tag(&self, tag: Tag) -> bool {
        self.trusted_tags.contains(&tag)
    }

    /// Whether any A answer falls inside the bad-subnet blocklist.
    pub fn bad_address(&self, addr: &std::net::IpAddr) -> bool {
        self.bad_subnets.iter().any(|net| net.contains(addr))
    }
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
