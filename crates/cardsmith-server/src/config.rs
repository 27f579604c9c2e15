//! Server configuration.

use std::net::{IpAddr, SocketAddr};

use crate::error::{Result, ServerError};

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

/// Default upload ceiling (50 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Headroom allowed on top of the upload ceiling for multipart framing.
pub(crate) const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Largest accepted document, in bytes.
    pub max_upload_bytes: usize,

    /// CORS allowed origins (empty = any origin).
    pub cors_origins: Vec<String>,

    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_origins: Vec::new(),
            request_logging: true,
        }
    }
}

impl ServerConfig {
    /// Create a server config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[server]` section of the config file.
    pub fn from_section(section: &cardsmith_config::ServerConfig) -> Result<Self> {
        let ip: IpAddr = section.bind.parse().map_err(|_| {
            ServerError::Config(format!("invalid bind address '{}'", section.bind))
        })?;

        Ok(Self {
            bind_address: SocketAddr::new(ip, section.port),
            max_upload_bytes: section.max_upload_bytes(),
            cors_origins: section.cors_origins.clone(),
            request_logging: section.request_logging,
        })
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set the upload ceiling in bytes.
    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Set CORS allowed origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Enable or disable request logging.
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    /// Body limit for the upload route, including multipart framing.
    pub(crate) fn upload_body_limit(&self) -> usize {
        self.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD)
    }
}
