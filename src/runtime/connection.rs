//! Accepted connections and the registry that owns them.
//!
//! A connection's identity is its slab index, which doubles as its mio token.

use mio::net::TcpStream;
use slab::Slab;
use std::net::SocketAddr;

/// Identity of a registered connection.
pub type ConnectionId = usize;

/// A single accepted peer session.
///
/// The read buffer itself lives in the loop's `BufferPool`; the connection
/// only holds its index and the fill cursor for the current read.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    /// Non-blocking socket, registered for readable interest only.
    pub stream: S,
    /// Remote address reported by accept.
    pub peer: SocketAddr,
    /// Index of this connection's buffer in the pool.
    pub buf_idx: usize,
    /// Bytes of the last read that are available for consumption.
    filled: usize,
}

impl<S> Connection<S> {
    pub fn new(stream: S, peer: SocketAddr, buf_idx: usize) -> Self {
        Self {
            stream,
            peer,
            buf_idx,
            filled: 0,
        }
    }

    /// Reset the buffer to empty before a read.
    pub fn reset(&mut self) {
        self.filled = 0;
    }

    /// Record how many bytes the last read placed in the buffer.
    pub fn set_filled(&mut self, n: usize) {
        self.filled = n;
    }

    pub fn filled(&self) -> usize {
        self.filled
    }
}

/// Registry of live connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations. There is no capacity
/// limit: every accepted connection is admitted.
pub struct ConnectionRegistry<S = TcpStream> {
    connections: Slab<Connection<S>>,
}

impl<S> ConnectionRegistry<S> {
    pub fn new() -> Self {
        Self {
            connections: Slab::new(),
        }
    }

    /// Id the next `insert` will return.
    pub fn next_id(&self) -> ConnectionId {
        self.connections.vacant_key()
    }

    /// Insert a new connection, returning its id.
    pub fn insert(&mut self, conn: Connection<S>) -> ConnectionId {
        self.connections.insert(conn)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection<S>> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection<S>> {
        self.connections.get_mut(id)
    }

    /// Remove a connection. Removing an id twice returns `None` the second time.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection<S>> {
        self.connections.try_remove(id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains(id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ids of all live connections.
    pub fn ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().map(|(id, _)| id)
    }
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
