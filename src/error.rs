// ABOUTME: Error taxonomy shared across connection, router, and gateway modules
// ABOUTME: Module-local thiserror enums per spec.md §7; a boxed alias glues them together at the top

use thiserror::Error;

/// Errors surfaced while establishing or driving a gateway forwarder's
/// backend connection.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to connect to backend {host}:{port}: {source}")]
    BackendUnreachable {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Generic error type for top-level glue code, mirroring the teacher's
/// `Box<dyn std::error::Error + Send + Sync>` convenience alias.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for gatehouse operations.
pub type Result<T> = std::result::Result<T, Error>;
