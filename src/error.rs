//! A dedicated error type for all fallible operations in ecsplorer: I/O,
//! configuration parsing, DNS transport, and malformed input lines.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EcsplorerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse YAML config: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("DNS protocol error: {0}")]
    Dns(#[from] hickory_proto::error::ProtoError),

    #[error("invalid CIDR prefix '{0}'")]
    InvalidPrefix(String),

    #[error("invalid IP address '{0}'")]
    InvalidAddress(String),

    #[error("{0}")]
    Other(String),
}

/// A specific custom `Result` for all functions in this crate.
pub type EcsplorerResult<T> = Result<T, EcsplorerError>;
