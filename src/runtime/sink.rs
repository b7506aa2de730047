//! Destinations for bytes read off connections.
//!
//! The event loop hands every read of one or more bytes to a `Sink`, trimmed,
//! together with the connection that produced it. A payload may be empty
//! when the read held only whitespace or padding. Delivery is in receipt
//! order per connection; nothing is delivered for a connection once its close
//! has been reported.

use crate::runtime::ConnectionId;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::mpsc::Sender;
use tracing::{debug, info};

/// Receiver of relayed payloads.
pub trait Sink {
    /// One read's worth of trimmed bytes from `conn`.
    fn deliver(&mut self, conn: ConnectionId, peer: SocketAddr, payload: Bytes);

    /// `conn` was torn down. Called once per connection.
    fn closed(&mut self, _conn: ConnectionId, _peer: SocketAddr) {}
}

/// Logs each payload as text, one line per read.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl Sink for ConsoleSink {
    fn deliver(&mut self, conn: ConnectionId, peer: SocketAddr, payload: Bytes) {
        let body = String::from_utf8_lossy(&payload);
        info!(conn_id = conn, peer = %peer, "Received data: {}", body);
    }

    fn closed(&mut self, conn: ConnectionId, peer: SocketAddr) {
        debug!(conn_id = conn, peer = %peer, "Peer closed");
    }
}

/// Event forwarded by `ChannelSink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Data {
        conn: ConnectionId,
        peer: SocketAddr,
        payload: Bytes,
    },
    Closed {
        conn: ConnectionId,
        peer: SocketAddr,
    },
}

/// Forwards events to another thread over a channel.
///
/// A disconnected receiver is not an error for the loop; events are dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<SinkEvent>) -> Self {
        Self { tx }
    }
}

impl Sink for ChannelSink {
    fn deliver(&mut self, conn: ConnectionId, peer: SocketAddr, payload: Bytes) {
        let _ = self.tx.send(SinkEvent::Data {
            conn,
            peer,
            payload,
        });
    }

    fn closed(&mut self, conn: ConnectionId, peer: SocketAddr) {
        let _ = self.tx.send(SinkEvent::Closed { conn, peer });
    }
}

/// Strip leading and trailing bytes at or below `0x20`.
///
/// Covers whitespace, line endings and the NUL padding a fixed-size client
/// buffer leaves behind.
pub fn trim_payload(bytes: &[u8]) -> &[u8] {
    let start = match bytes.iter().position(|&b| b > b' ') {
        Some(start) => start,
        None => return &[],
    };
    // A non-control byte exists, so rposition finds one too.
    let end = bytes.iter().rposition(|&b| b > b' ').map_or(start, |i| i + 1);
    &bytes[start..end]
}
