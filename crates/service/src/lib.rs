//! Service infrastructure for the shardgate object gateway.
//!
//! This crate wires the node pool and router from `common` into a running
//! process:
//! - Configuration (`Config`, resolved by the binary)
//! - State management (`ServiceState`: router, pool and the proxy client)
//! - HTTP handlers (object read/write, payload guard, health checks)
//! - Process bootstrap (logging, node refresh loop, graceful shutdown)

pub mod config;
pub mod http;
pub mod process;
pub mod state;

// Re-export key types for convenience
pub use config::{Config, ConfigError, DiscoveryConfig};
pub use process::spawn_service;
pub use state::{State as ServiceState, StateSetupError};
