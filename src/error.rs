use thiserror::Error;

/// Errors surfaced by the enumeration engine.
///
/// Only configuration failures and cancellation ever reach the caller of
/// [`crate::enumeration::Enumeration::start`]; resolver and graph failures
/// are logged at their call sites and degrade to empty results.
#[derive(Error, Debug, Clone)]
pub enum EnumError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("enumeration cancelled")]
    Cancelled,

    #[error("resolver error: {0}")]
    Resolve(String),

    #[error("graph error: {0}")]
    Graph(String),
}

pub type Result<T> = std::result::Result<T, EnumError>;
