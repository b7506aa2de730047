//! relay-reactor: a minimal single-threaded network reactor.
//!
//! One non-blocking listener accepts TCP connections and every byte they
//! send is relayed to a sink (the console log by default). A readiness
//! multiplexer drives everything; there is no thread per connection.
//!
//! The crate also ships `relay-client`, which writes its standard input to
//! the server.

pub mod client;
pub mod config;
pub mod error;
pub mod runtime;

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
