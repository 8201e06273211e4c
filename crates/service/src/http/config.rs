use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Listen address
    pub listen_addr: SocketAddr,
    // Upper bound on a single request, proxied reads included
    pub request_timeout: Duration,
    // log level for http tracing
    pub log_level: tracing::Level,
}

impl Config {
    pub fn new(listen_addr: SocketAddr, request_timeout: Duration) -> Self {
        tracing::info!(
            "Creating HTTP server Config: listen_addr={}, request_timeout={:?}",
            listen_addr,
            request_timeout
        );
        Self {
            listen_addr,
            request_timeout,
            log_level: tracing::Level::INFO,
        }
    }
}
