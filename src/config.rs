// ABOUTME: Service configuration: on-disk defaults plus environment variable overrides
// ABOUTME: Loader is intentionally thin; spec.md treats the config format itself as an external concern

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Base fields every `gatehouse` process needs (spec.md §6).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub listen_port: u16,
    pub worker_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 9000,
            worker_threads: 4,
        }
    }
}

impl Config {
    /// Load a config file if present, falling back to defaults when it does
    /// not exist. A file that exists but fails to parse is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        validate_worker_threads(config.worker_threads)?;
        Ok(config)
    }
}

/// Gateway-specific configuration: the gateway's own listen port plus the
/// backend it forwards to. spec.md §6 names `GATEWAY_PORT`, `BACKEND_HOST`,
/// `BACKEND_PORT` as the override variables.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    pub listen_port: u16,
    pub worker_threads: usize,
    pub backend_host: String,
    pub backend_port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_port: 9001,
            worker_threads: 4,
            backend_host: "127.0.0.1".to_string(),
            backend_port: 9000,
        }
    }
}

impl GatewayConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        validate_worker_threads(config.worker_threads)?;
        Ok(config)
    }

    /// Apply `GATEWAY_PORT` / `BACKEND_HOST` / `BACKEND_PORT` env var
    /// overrides on top of whatever was loaded from disk, per spec.md §6.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            if let Ok(port) = port.parse() {
                self.listen_port = port;
            }
        }
        if let Ok(host) = std::env::var("BACKEND_HOST") {
            self.backend_host = host;
        }
        if let Ok(port) = std::env::var("BACKEND_PORT") {
            if let Ok(port) = port.parse() {
                self.backend_port = port;
            }
        }
        self
    }
}

/// Shared by `Config::load` and `GatewayConfig::load`: a service with zero
/// worker threads would spawn no workers and silently accept no
/// connections, so this is rejected at load time rather than left to
/// manifest as a hung server.
fn validate_worker_threads(worker_threads: usize) -> Result<(), ConfigError> {
    if worker_threads == 0 {
        return Err(ConfigError::InvalidValue {
            field: "worker_threads",
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
