//! Error types shared by the gavel crates.

use thiserror::Error;

use crate::types::ServiceRole;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Configuration and topology errors.
///
/// These are never retried: they describe a harness setup that cannot
/// work and must be fixed by the operator.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read config file {path}: {message}")]
    ReadConfig { path: String, message: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown relational engine: {0} (supported: postgresql, mysql)")]
    UnknownEngine(String),

    #[error("no active {0} instances")]
    NoInstances(ServiceRole),

    #[error(
        "sharded and replicated NoSQL topology is not supported \
         (shards={shards}, replicas={replicas})"
    )]
    UnsupportedTopology { shards: u32, replicas: u32 },

    #[error("sharded NoSQL topology requires a router address")]
    MissingRouter,

    #[error("service {service} does not expose protocol {protocol}")]
    MissingPort { service: String, protocol: String },
}
