//! Server configuration
//!
//! Defaults, optionally overridden by a TOML file, then by `RELAY_*`
//! environment variables. Immutable once the server is started.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Default listening port
pub const DEFAULT_PORT: u16 = 9000;

/// Default read-inactivity timeout in seconds
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 20;

/// Relay server settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port to listen on
    pub port: u16,
    /// Interface to bind (0.0.0.0 = all)
    pub bind_address: IpAddr,
    /// Display name sent in presence updates
    pub server_name: String,
    /// Seconds a connection may stay silent before it is dropped
    pub read_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_name: "Relay Server".into(),
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Parse from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, AppError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `RELAY_*` overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("RELAY_PORT") {
            self.port = port
                .parse()
                .map_err(|_| AppError::Config(format!("invalid RELAY_PORT: {}", port)))?;
        }
        if let Some(bind) = lookup("RELAY_BIND") {
            self.bind_address = bind
                .parse()
                .map_err(|_| AppError::Config(format!("invalid RELAY_BIND: {}", bind)))?;
        }
        if let Some(name) = lookup("RELAY_SERVER_NAME") {
            self.server_name = name;
        }
        if let Some(secs) = lookup("RELAY_READ_TIMEOUT") {
            self.read_timeout_secs = secs
                .parse()
                .map_err(|_| AppError::Config(format!("invalid RELAY_READ_TIMEOUT: {}", secs)))?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.server_name.contains('|') {
            return Err(AppError::Config(
                "server_name must not contain '|'".to_string(),
            ));
        }
        if self.read_timeout_secs == 0 {
            return Err(AppError::Config(
                "read_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
