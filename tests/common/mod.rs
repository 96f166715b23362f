//! Shared test harness: a scripted resolver that records every query it
//! receives, plus config helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::IpAddr;

use muninn::config::EnumConfig;
use muninn::error::{EnumError, Result};
use muninn::requests::{DNSAnswer, DNSRequest, RecordType};
use muninn::resolve::Resolver;

/// Resolver answering from scripted tables. Unscripted queries return an
/// error, which the pipeline treats as an empty answer.
#[derive(Default)]
pub struct MockResolver {
    exact: DashMap<(String, u16), Vec<DNSAnswer>>,
    /// (zone suffix, rrtype, data): any name under the suffix answers with
    /// the same data, emulating a wildcard zone.
    wildcards: Mutex<Vec<(String, u16, String)>>,
    reverse: DashMap<String, (String, String)>,
    transfers: DashMap<(String, String), Vec<DNSRequest>>,
    calls: Mutex<Vec<(String, u16)>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(&self, name: &str, rrtype: RecordType, data: &[&str]) {
        let answers = data
            .iter()
            .map(|d| DNSAnswer {
                name: name.to_string(),
                rrtype: rrtype.to_u16(),
                ttl: 300,
                data: d.to_string(),
            })
            .collect();
        self.exact.insert((name.to_string(), rrtype.to_u16()), answers);
    }

    /// Answer every name under `zone` with the same data.
    pub fn wildcard(&self, zone: &str, rrtype: RecordType, data: &str) {
        self.wildcards
            .lock()
            .push((format!(".{zone}"), rrtype.to_u16(), data.to_string()));
    }

    pub fn reverse_entry(&self, ip: &str, ptr: &str, target: &str) {
        self.reverse
            .insert(ip.to_string(), (ptr.to_string(), target.to_string()));
    }

    pub fn transfer(&self, sub: &str, server: &str, requests: Vec<DNSRequest>) {
        self.transfers
            .insert((sub.to_string(), server.to_string()), requests);
    }

    /// Every (name, rrtype) query issued so far, in order.
    pub fn calls(&self) -> Vec<(String, u16)> {
        self.calls.lock().clone()
    }

    /// The record types queried for one name, in order.
    pub fn calls_for(&self, name: &str) -> Vec<u16> {
        self.calls
            .lock()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, t)| *t)
            .collect()
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve(&self, name: &str, rrtype: RecordType) -> Result<Vec<DNSAnswer>> {
        self.calls.lock().push((name.to_string(), rrtype.to_u16()));

        if let Some(answers) = self.exact.get(&(name.to_string(), rrtype.to_u16())) {
            return Ok(answers.clone());
        }
        for (suffix, wtype, data) in self.wildcards.lock().iter() {
            if name.ends_with(suffix.as_str()) && *wtype == rrtype.to_u16() {
                return Ok(vec![DNSAnswer {
                    name: name.to_string(),
                    rrtype: *wtype,
                    ttl: 60,
                    data: data.clone(),
                }]);
            }
        }
        Err(EnumError::Resolve(format!("{name} {rrtype}: no record")))
    }

    async fn reverse(&self, addr: IpAddr) -> Result<(String, String)> {
        self.reverse
            .get(&addr.to_string())
            .map(|e| e.clone())
            .ok_or_else(|| EnumError::Resolve(format!("PTR {addr}: no record")))
    }

    async fn zone_transfer(
        &self,
        sub: &str,
        _domain: &str,
        server: &str,
    ) -> Result<Vec<DNSRequest>> {
        self.transfers
            .get(&(sub.to_string(), server.to_string()))
            .map(|e| e.clone())
            .ok_or_else(|| EnumError::Resolve(format!("AXFR {sub} @{server}: refused")))
    }
}

pub fn test_config(domains: &[&str]) -> EnumConfig {
    EnumConfig {
        domains: domains.iter().map(|d| d.to_string()).collect(),
        ..Default::default()
    }
}
