//! Error types for the relay reactor.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop the event loop or prevent it from starting.
///
/// Per-connection failures (accept, read) never show up here: they are
/// logged by the handlers and the loop keeps going.
#[derive(Error, Debug)]
pub enum ReactorError {
    /// The OS could not allocate the readiness primitive (epoll/kqueue fd).
    #[error("failed to allocate readiness multiplexer: {0}")]
    ResourceExhaustion(#[source] io::Error),

    /// The listening socket could not be created or bound.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// A channel could not be registered, e.g. because it is already closed.
    #[error("invalid channel for token {token}: {source}")]
    InvalidChannel {
        token: usize,
        #[source]
        source: io::Error,
    },

    /// Waiting for readiness failed for a reason other than an interrupt.
    #[error("readiness wait failed: {0}")]
    Poll(#[source] io::Error),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid listen address '{0}' (expected 'host:port')")]
    InvalidAddress(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}
