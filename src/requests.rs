use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::names;

/// Origin classification for a discovered name.
///
/// The tag records how a name was obtained. Tags in the configured trusted
/// set bypass wildcard filtering during validation because their provenance
/// (e.g. certificate transparency) vouches for the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    #[default]
    None,
    Alt,
    Api,
    Archive,
    Axfr,
    Brute,
    Cert,
    Dns,
    External,
    Guess,
    Scrape,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::None => "none",
            Tag::Alt => "alt",
            Tag::Api => "api",
            Tag::Archive => "archive",
            Tag::Axfr => "axfr",
            Tag::Brute => "brute",
            Tag::Cert => "cert",
            Tag::Dns => "dns",
            Tag::External => "external",
            Tag::Guess => "guess",
            Tag::Scrape => "scrape",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alt" => Ok(Tag::Alt),
            "api" => Ok(Tag::Api),
            "archive" => Ok(Tag::Archive),
            "axfr" => Ok(Tag::Axfr),
            "brute" => Ok(Tag::Brute),
            "cert" => Ok(Tag::Cert),
            "dns" => Ok(Tag::Dns),
            "external" => Ok(Tag::External),
            "guess" => Ok(Tag::Guess),
            "scrape" => Ok(Tag::Scrape),
            _ => Err(()),
        }
    }
}

/// DNS record types the engine works with, by IANA number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    SPF,
    AXFR,
}

impl RecordType {
    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::SPF => 99,
            RecordType::AXFR => 252,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(RecordType::A),
            2 => Some(RecordType::NS),
            5 => Some(RecordType::CNAME),
            6 => Some(RecordType::SOA),
            12 => Some(RecordType::PTR),
            15 => Some(RecordType::MX),
            16 => Some(RecordType::TXT),
            28 => Some(RecordType::AAAA),
            33 => Some(RecordType::SRV),
            99 => Some(RecordType::SPF),
            252 => Some(RecordType::AXFR),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::NS => "NS",
            RecordType::CNAME => "CNAME",
            RecordType::SOA => "SOA",
            RecordType::PTR => "PTR",
            RecordType::MX => "MX",
            RecordType::TXT => "TXT",
            RecordType::AAAA => "AAAA",
            RecordType::SRV => "SRV",
            RecordType::SPF => "SPF",
            RecordType::AXFR => "AXFR",
        };
        f.write_str(s)
    }
}

/// Record types requested for every newly discovered name, in order.
/// A CNAME answer short-circuits the remaining address lookups.
pub const INITIAL_QUERY_TYPES: [RecordType; 4] = [
    RecordType::TXT,
    RecordType::CNAME,
    RecordType::A,
    RecordType::AAAA,
];

/// Record types in the per-subdomain priming bundle.
pub const BASIC_QUERY_TYPES: [RecordType; 4] = [
    RecordType::NS,
    RecordType::MX,
    RecordType::SOA,
    RecordType::SPF,
];

/// A single DNS answer attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DNSAnswer {
    pub name: String,
    /// IANA record type number.
    pub rrtype: u16,
    pub ttl: u32,
    pub data: String,
}

/// A candidate or resolved name moving through the pipeline.
///
/// Requests are created by seeding or derivation, mutated only to attach
/// records, and dropped after storage (or on rejection). Cloning produces an
/// independent copy for parallel dispatch to the data sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DNSRequest {
    pub name: String,
    /// The in-scope root this name belongs to.
    pub domain: String,
    pub records: Vec<DNSAnswer>,
    pub tag: Tag,
    pub source: String,
}

impl DNSRequest {
    pub fn new(name: &str, domain: &str, tag: Tag, source: &str) -> Self {
        Self {
            name: name.trim().trim_end_matches('.').to_lowercase(),
            domain: domain.trim().trim_end_matches('.').to_lowercase(),
            records: Vec::new(),
            tag,
            source: source.to_string(),
        }
    }

    /// Append answers, skipping (type, data) pairs already present.
    pub fn attach_records(&mut self, answers: Vec<DNSAnswer>) {
        for ans in answers {
            if !self
                .records
                .iter()
                .any(|r| r.rrtype == ans.rrtype && r.data == ans.data)
            {
                self.records.push(ans);
            }
        }
    }

    /// Data fields of all A/AAAA answers that parse as addresses.
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.records
            .iter()
            .filter(|r| {
                r.rrtype == RecordType::A.to_u16() || r.rrtype == RecordType::AAAA.to_u16()
            })
            .filter_map(|r| r.data.parse().ok())
            .collect()
    }

    /// Whether the request's name is valid and inside its own domain.
    pub fn in_scope(&self) -> bool {
        !self.domain.is_empty() && names::is_subdomain(&self.name, &self.domain)
    }
}

/// Seed request for ASN-aware data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ASNRequest {
    pub asn: i32,
}

/// A seed element delivered to external data sources.
#[derive(Debug, Clone)]
pub enum SourceRequest {
    Dns(DNSRequest),
    Asn(ASNRequest),
}
