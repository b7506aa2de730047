//! mio event loop implementation.
//!
//! Readiness-based model: the multiplexer tells us when the listener has
//! pending connections or a connection has bytes, then we perform
//! non-blocking accept/read syscalls until they would block. Everything runs
//! on the calling thread; handlers never block.

use crate::config::{Config, ReadErrorPolicy};
use crate::error::ReactorError;
use crate::runtime::poller::{Interest, Multiplexer, Ready, ReadySet};
use crate::runtime::sink::{trim_payload, Sink};
use crate::runtime::{BufferPool, Connection, ConnectionId, ConnectionRegistry};
use bytes::Bytes;
use mio::net::TcpListener;
use mio::{Token, Waker};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub const LISTENER_TOKEN: Token = Token(usize::MAX);
const WAKE_TOKEN: Token = Token(usize::MAX - 1);

/// Stops a running `EventLoop` from any thread.
///
/// The flag is checked once per loop iteration; `shutdown` also wakes the
/// multiplexer so a loop blocked in its wait notices promptly.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake event loop");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Result of draining a readable connection.
#[derive(Debug)]
pub(crate) enum DrainOutcome {
    /// Nothing more to read for now; the connection stays registered.
    Pending,
    /// The peer closed its end.
    PeerClosed,
    /// A read failed with something other than `WouldBlock`.
    Failed(io::Error),
}

/// Single-threaded accept/read loop relaying connection bytes to a sink.
pub struct EventLoop<K> {
    mux: Multiplexer,
    ready: ReadySet,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: ConnectionRegistry,
    buffers: BufferPool,
    sink: K,
    read_error_policy: ReadErrorPolicy,
    shutdown: ShutdownHandle,
}

impl<K: Sink> EventLoop<K> {
    /// Open the multiplexer, bind the listener and register it for accepts.
    pub fn bind(config: &Config, sink: K) -> Result<Self, ReactorError> {
        let mut mux = Multiplexer::open(config.event_capacity)?;

        let bind_err = |source: io::Error| ReactorError::Bind {
            addr: config.listen,
            source,
        };
        let listener = create_listener(config.listen, config.backlog).map_err(bind_err)?;
        let mut listener = TcpListener::from_std(listener);
        let local_addr = listener.local_addr().map_err(bind_err)?;
        mux.register(&mut listener, LISTENER_TOKEN, Interest::Acceptable)?;

        let waker = mux.waker(WAKE_TOKEN)?;

        Ok(Self {
            mux,
            ready: ReadySet::with_capacity(config.event_capacity),
            listener,
            local_addr,
            connections: ConnectionRegistry::new(),
            buffers: BufferPool::new(0, config.buffer_size),
            sink,
            read_error_policy: config.read_error_policy,
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
                waker,
            },
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_registered(&self, conn_id: ConnectionId) -> bool {
        self.connections.contains(conn_id)
    }

    /// Wait, dispatch, repeat until the shutdown handle fires.
    ///
    /// Per-connection failures are logged and never end the loop; only a
    /// failing wait does.
    pub fn run(&mut self) -> Result<(), ReactorError> {
        info!(addr = %self.local_addr, "Event loop started");

        let mut ready = std::mem::take(&mut self.ready);
        while !self.shutdown.is_shutdown() {
            self.mux.wait_for_ready(&mut ready, None)?;
            trace!(ready = ready.len(), "Woke up");

            for entry in ready.drain() {
                self.dispatch(entry);
            }
        }
        self.ready = ready;

        info!(connections = self.connections.len(), "Event loop stopped");
        Ok(())
    }

    fn dispatch(&mut self, entry: Ready) {
        let conn_id = entry.token.0;

        // A handler earlier in this batch may have closed the channel.
        if entry.token != LISTENER_TOKEN && !self.connections.contains(conn_id) {
            trace!(conn_id, "Skipping event for closed connection");
            return;
        }

        if entry.acceptable {
            self.accept_connections();
        }
        if entry.readable && self.connections.contains(conn_id) {
            self.read_connection(conn_id);
        }
    }

    /// Accept until the listener would block, registering each new
    /// connection for readable interest only.
    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    // mio returns accepted streams already in non-blocking mode.
                    let conn_id = self.connections.next_id();
                    let token = Token(conn_id);
                    if let Err(e) = self.mux.register(&mut stream, token, Interest::Readable) {
                        warn!(peer = %peer, error = %e, "Failed to register connection");
                        continue;
                    }

                    let buf_idx = self.buffers.alloc();
                    let inserted = self
                        .connections
                        .insert(Connection::new(stream, peer, buf_idx));
                    debug_assert_eq!(inserted, conn_id);

                    debug!(conn_id, peer = %peer, "Accepted connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    fn read_connection(&mut self, conn_id: ConnectionId) {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return;
        };
        let peer = conn.peer;
        let buf = self.buffers.get_mut(conn.buf_idx);
        let sink = &mut self.sink;

        let outcome = drain(conn, buf, |payload| sink.deliver(conn_id, peer, payload));
        self.on_outcome(conn_id, peer, outcome);
    }

    /// Apply the end-of-stream and read-error rules to a drained connection.
    fn on_outcome(&mut self, conn_id: ConnectionId, peer: SocketAddr, outcome: DrainOutcome) {
        match outcome {
            DrainOutcome::Pending => {}
            DrainOutcome::PeerClosed => {
                debug!(conn_id, peer = %peer, "Peer closed connection");
                self.close_connection(conn_id);
            }
            DrainOutcome::Failed(e) => match self.read_error_policy {
                ReadErrorPolicy::Keep => {
                    warn!(conn_id, peer = %peer, error = %e, "Read failed");
                }
                ReadErrorPolicy::Close => {
                    warn!(conn_id, peer = %peer, error = %e, "Read failed, closing connection");
                    self.close_connection(conn_id);
                }
            },
        }
    }

    /// Deregister, release the buffer and drop the stream. A second call for
    /// the same id is a no-op.
    fn close_connection(&mut self, conn_id: ConnectionId) {
        if let Some(mut conn) = self.connections.remove(conn_id) {
            // The fd must still be open for deregister; dropping conn closes it.
            let _ = self.mux.deregister(&mut conn.stream, Token(conn_id));
            self.buffers.free(conn.buf_idx);
            self.sink.closed(conn_id, conn.peer);
            debug!(conn_id, peer = %conn.peer, "Connection closed");
        }
    }
}

/// Read from `conn` until it would block, handing each read's trimmed bytes
/// to `deliver`.
///
/// The buffer is reset before every read and holds exactly the bytes of that
/// read afterwards. Every read of one or more bytes is delivered, even when
/// trimming leaves nothing.
pub(crate) fn drain<S: Read>(
    conn: &mut Connection<S>,
    buf: &mut [u8],
    mut deliver: impl FnMut(Bytes),
) -> DrainOutcome {
    loop {
        conn.reset();
        match conn.stream.read(buf) {
            Ok(0) => return DrainOutcome::PeerClosed,
            Ok(n) => {
                conn.set_filled(n);
                let payload = trim_payload(&buf[..conn.filled()]);
                deliver(Bytes::copy_from_slice(payload));
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return DrainOutcome::Pending,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return DrainOutcome::Failed(e),
        }
    }
}

/// Create a non-blocking TCP listener with `SO_REUSEADDR`.
fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    Ok(socket.into())
}
