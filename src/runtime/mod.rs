//! Single-threaded readiness reactor.
//!
//! One thread owns everything:
//! - `Multiplexer`: the OS readiness primitive (epoll/kqueue via mio)
//! - `ConnectionRegistry`: live connections keyed by token
//! - `BufferPool`: one read buffer per live connection
//! - `EventLoop`: wait, dispatch to accept/read handlers, repeat
//!
//! Bytes read off connections go to a `Sink`.

mod buffer;
mod connection;
mod event_loop;
mod poller;
mod sink;

pub(crate) use buffer::BufferPool;
pub use connection::{Connection, ConnectionId, ConnectionRegistry};
pub use event_loop::{EventLoop, ShutdownHandle, LISTENER_TOKEN};
pub use poller::{Interest, Multiplexer, Ready, ReadySet};
pub use sink::{trim_payload, ChannelSink, ConsoleSink, Sink, SinkEvent};

use crate::config::Config;
use crate::error::ReactorError;
use tracing::info;

/// Run the relay server, logging every payload to the console.
///
/// Returns only if the readiness wait itself fails.
pub fn run(config: Config) -> Result<(), ReactorError> {
    let mut event_loop = EventLoop::bind(&config, ConsoleSink)?;

    info!(
        addr = %event_loop.local_addr(),
        buffer_size = config.buffer_size,
        event_capacity = config.event_capacity,
        read_error_policy = ?config.read_error_policy,
        "Listening"
    );

    event_loop.run()
}
