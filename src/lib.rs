pub mod config;
pub mod datasrcs;
pub mod enumeration;
pub mod error;
pub mod filter;
pub mod graph;
pub mod names;
pub mod pipeline;
pub mod requests;
pub mod resolve;
pub mod wildcard;

pub use config::EnumConfig;
pub use enumeration::Enumeration;
pub use error::{EnumError, Result};
pub use requests::{ASNRequest, DNSAnswer, DNSRequest, RecordType, Tag};
