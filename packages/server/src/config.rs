//! Server configuration.

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: i32 = 1000;

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 10;

/// Configuration for a [`Reactor`](crate::reactor::Reactor).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listening socket to.
    pub host: String,
    /// Port to bind to; `0` picks an ephemeral port (used by tests).
    pub port: u16,
    /// Listen backlog passed to the OS.
    pub backlog: i32,
    /// Number of worker threads handling readiness events.
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            workers: DEFAULT_WORKERS,
        }
    }
}
