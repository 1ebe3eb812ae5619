//! Server configuration.
//!
//! Read once at startup. `server_ip`/`server_port` are the two options the
//! deployment sets; the rest are limits with sensible defaults.

use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use thiserror::Error;

/// Default bind address (all interfaces).
pub const DEFAULT_SERVER_IP: &str = "0.0.0.0";

/// Default bind port.
pub const DEFAULT_SERVER_PORT: u16 = 80;

/// Default cap on simultaneously open connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Longest the loop blocks in one poll when no thread is ready.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes requested from a socket per read call.
pub const DEFAULT_READ_CHUNK: usize = 4096;

/// Invalid configuration, detected before anything is bound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `server_ip` is not an IP address
    #[error("invalid server_ip {ip:?}: {reason}")]
    InvalidAddress {
        /// Value supplied
        ip: String,
        /// Parser message
        reason: String,
    },

    /// A limit that must be positive was zero
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Event loop configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// IP address to listen on
    pub server_ip: String,
    /// TCP port to listen on (0 picks an ephemeral port)
    pub server_port: u16,
    /// Maximum concurrent connections; further accepts are dropped
    pub max_connections: usize,
    /// Poll wait bound while no request thread is ready
    pub poll_timeout: Duration,
    /// Per-read buffer reservation for connections
    pub read_chunk: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_ip: DEFAULT_SERVER_IP.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

impl ServerConfig {
    /// Config listening on `ip:port` with default limits.
    pub fn listen_on(ip: impl Into<String>, port: u16) -> Self {
        Self { server_ip: ip.into(), server_port: port, ..Self::default() }
    }

    /// Check limits and resolve the bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroLimit("max_connections"));
        }
        if self.read_chunk == 0 {
            return Err(ConfigError::ZeroLimit("read_chunk"));
        }

        let ip: IpAddr = self.server_ip.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidAddress { ip: self.server_ip.clone(), reason: e.to_string() }
        })?;
        Ok(SocketAddr::new(ip, self.server_port))
    }
}
