//! Configuration for the AtlasKV client
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Main configuration for a client instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Server to connect to
    pub endpoint: Endpoint,

    /// How long `start()` waits for the connection handshake
    pub connect_timeout: Duration,

    /// Disable Nagle's algorithm on TCP connections
    pub nodelay: bool,

    // -------------------------------------------------------------------------
    // Reactor Configuration
    // -------------------------------------------------------------------------
    /// Upper bound on a single poll wait. Bounds the latency of any wake-up
    /// the waker misses.
    pub poll_interval: Duration,

    /// Extra iterations run after a stop signal to collect trailing replies
    pub shutdown_flush_iterations: usize,

    // -------------------------------------------------------------------------
    // Command Configuration
    // -------------------------------------------------------------------------
    /// Default wait for `submit_blocking` (None waits forever)
    pub blocking_timeout: Option<Duration>,

    // -------------------------------------------------------------------------
    // Buffer Configuration
    // -------------------------------------------------------------------------
    /// Bytes reserved per socket read
    pub read_buffer_size: usize,

    /// Largest bulk string or array length accepted from the server
    pub max_reply_size: usize,
}

/// Where the server lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port
    Tcp { host: String, port: u16 },

    /// Unix domain socket path
    Unix(PathBuf),
}

impl Endpoint {
    /// TCP endpoint
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Unix socket endpoint
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Endpoint::Unix(path.into())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::tcp("127.0.0.1", 6379),
            connect_timeout: Duration::from_secs(5),
            nodelay: true,
            poll_interval: Duration::from_millis(10),
            shutdown_flush_iterations: 100,
            blocking_timeout: Some(Duration::from_secs(5)),
            read_buffer_size: 16 * 1024, // 16 KB
            max_reply_size: 512 * 1024 * 1024, // 512 MB, the server's own bulk limit
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values that would make the reactor misbehave
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(ClientError::Config(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ClientError::Config(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        if let Endpoint::Tcp { host, .. } = &self.endpoint {
            if host.is_empty() {
                return Err(ClientError::Config("empty host".to_string()));
            }
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Connect over TCP
    pub fn tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.endpoint = Endpoint::tcp(host, port);
        self
    }

    /// Connect over a Unix domain socket
    pub fn unix(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.endpoint = Endpoint::unix(path);
        self
    }

    /// Set the endpoint directly
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Set the connect handshake timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Set the reactor poll granularity
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the number of flush iterations run on shutdown
    pub fn shutdown_flush_iterations(mut self, iterations: usize) -> Self {
        self.config.shutdown_flush_iterations = iterations;
        self
    }

    /// Set the default blocking call timeout
    pub fn blocking_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.blocking_timeout = timeout;
        self
    }

    /// Set the socket read chunk size (in bytes)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the largest accepted bulk/array length
    pub fn max_reply_size(mut self, size: usize) -> Self {
        self.config.max_reply_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
