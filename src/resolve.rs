//! The resolver capability the pipeline consumes, plus the stub-resolver
//! implementation backed by hickory.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::{RData, Record, RecordType as WireType};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

use crate::error::{EnumError, Result};
use crate::names;
use crate::requests::{DNSAnswer, DNSRequest, RecordType, Tag};

/// DNS lookups as the enumeration pipeline needs them. Errors from any of
/// these calls are logged by the caller and treated as empty answers.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Query a single record type for a name.
    async fn resolve(&self, name: &str, rrtype: RecordType) -> Result<Vec<DNSAnswer>>;

    /// Reverse lookup; returns the `in-addr.arpa` name and the target it
    /// points at.
    async fn reverse(&self, addr: IpAddr) -> Result<(String, String)>;

    /// Attempt a zone transfer for a subdomain against one of its
    /// authoritative servers.
    async fn zone_transfer(
        &self,
        sub: &str,
        domain: &str,
        server: &str,
    ) -> Result<Vec<DNSRequest>>;
}

/// Stub resolver over a pool of upstream servers.
pub struct StubResolver {
    inner: TokioAsyncResolver,
}

impl StubResolver {
    /// Build a resolver over the given upstream servers, falling back to the
    /// library defaults when the pool is empty.
    pub fn new(servers: &[SocketAddr]) -> Self {
        let config = if servers.is_empty() {
            ResolverConfig::default()
        } else {
            let mut config = ResolverConfig::new();
            for addr in servers {
                config.add_name_server(NameServerConfig::new(*addr, Protocol::Udp));
            }
            config
        };

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(3);
        opts.attempts = 2;

        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl Resolver for StubResolver {
    async fn resolve(&self, name: &str, rrtype: RecordType) -> Result<Vec<DNSAnswer>> {
        let wire_type = WireType::from(rrtype.to_u16());
        let lookup = self
            .inner
            .lookup(name, wire_type)
            .await
            .map_err(|e| EnumError::Resolve(format!("{name} {rrtype}: {e}")))?;

        Ok(lookup.records().iter().filter_map(answer_from_record).collect())
    }

    async fn reverse(&self, addr: IpAddr) -> Result<(String, String)> {
        let lookup = self
            .inner
            .reverse_lookup(addr)
            .await
            .map_err(|e| EnumError::Resolve(format!("PTR {addr}: {e}")))?;

        let target = lookup
            .iter()
            .next()
            .map(|ptr| trim_dot(&ptr.0.to_string()))
            .ok_or_else(|| EnumError::Resolve(format!("PTR {addr}: no answer")))?;

        Ok((names::ptr_name(addr), target))
    }

    async fn zone_transfer(
        &self,
        sub: &str,
        domain: &str,
        server: &str,
    ) -> Result<Vec<DNSRequest>> {
        use hickory_client::client::{AsyncClient, ClientHandle};
        use hickory_proto::iocompat::AsyncIoTokioAsStd;
        use hickory_proto::rr::{DNSClass, Name};
        use hickory_proto::tcp::TcpClientStream;
        use tokio::net::TcpStream;

        let addr: SocketAddr = if server.contains(':') {
            server.parse()
        } else {
            format!("{server}:53").parse()
        }
        .map_err(|e| EnumError::Resolve(format!("AXFR {sub}: bad server {server}: {e}")))?;

        let (stream, sender) = TcpClientStream::<AsyncIoTokioAsStd<TcpStream>>::new(addr);
        let (mut client, bg) = AsyncClient::new(stream, sender, None)
            .await
            .map_err(|e| EnumError::Resolve(format!("AXFR {sub} @{server}: {e}")))?;
        tokio::spawn(bg);

        let zone = Name::from_ascii(format!("{sub}."))
            .map_err(|e| EnumError::Resolve(format!("AXFR {sub}: {e}")))?;
        let response = client
            .query(zone, DNSClass::IN, WireType::AXFR)
            .await
            .map_err(|e| EnumError::Resolve(format!("AXFR {sub} @{server}: {e}")))?;

        let mut requests: Vec<DNSRequest> = Vec::new();
        for record in response.answers() {
            let Some(answer) = answer_from_record(record) else {
                continue;
            };
            let owner = answer.name.clone();
            if !names::is_subdomain(&owner, domain) {
                debug!("AXFR {sub}: out-of-scope owner {owner}");
                continue;
            }
            match requests.iter_mut().find(|r| r.name == owner) {
                Some(req) => req.attach_records(vec![answer]),
                None => {
                    let mut req = DNSRequest::new(&owner, domain, Tag::Axfr, "DNS Zone XFR");
                    req.attach_records(vec![answer]);
                    requests.push(req);
                }
            }
        }
        Ok(requests)
    }
}

/// Flatten a wire record into the answer form the pipeline carries. Target
/// names are reduced to bare FQDNs so downstream derivation can parse them.
fn answer_from_record(record: &Record) -> Option<DNSAnswer> {
    let data = record.data()?;
    let data = match data {
        RData::A(a) => a.to_string(),
        RData::AAAA(aaaa) => aaaa.to_string(),
        RData::CNAME(cname) => trim_dot(&cname.0.to_string()),
        RData::NS(ns) => trim_dot(&ns.0.to_string()),
        RData::PTR(ptr) => trim_dot(&ptr.0.to_string()),
        RData::MX(mx) => trim_dot(&mx.exchange().to_string()),
        RData::SRV(srv) => trim_dot(&srv.target().to_string()),
        RData::SOA(soa) => trim_dot(&soa.mname().to_string()),
        RData::TXT(txt) => txt
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
            .collect::<Vec<_>>()
            .join(""),
        other => other.to_string(),
    };
    if data.is_empty() {
        return None;
    }

    Some(DNSAnswer {
        name: trim_dot(&record.name().to_string()),
        rrtype: u16::from(record.record_type()),
        ttl: record.ttl(),
        data,
    })
}

fn trim_dot(name: &str) -> String {
    name.trim_end_matches('.').to_lowercase()
}
