//! Readiness multiplexer over mio (epoll on Linux, kqueue on macOS).
//!
//! Callers register channels with an `Interest` of either accepting or
//! reading; each wait fills a `ReadySet` with the channels that became ready,
//! already translated into those two notions. The multiplexer keeps no
//! application data, only which tokens belong to listeners.

use crate::error::ReactorError;
use mio::event::Source;
use mio::{Events, Poll, Token, Waker};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Event kinds a registered channel is watched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// A listener with pending inbound connections.
    Acceptable,
    /// A connection with bytes (or end-of-stream) to read.
    Readable,
}

/// One ready channel reported by a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub token: Token,
    pub acceptable: bool,
    pub readable: bool,
}

/// Ready channels from a single wait, consumed once by draining.
#[derive(Debug, Default)]
pub struct ReadySet {
    entries: Vec<Ready>,
}

impl ReadySet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ready> {
        self.entries.iter()
    }

    /// Remove and yield entries in the order the OS reported them.
    pub fn drain(&mut self) -> impl Iterator<Item = Ready> + '_ {
        self.entries.drain(..)
    }
}

/// Owner of the OS readiness primitive.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    acceptors: HashSet<Token>,
    wake_token: Option<Token>,
}

impl Multiplexer {
    /// Create an empty multiplexer reporting up to `capacity` events per wait.
    pub fn open(capacity: usize) -> Result<Self, ReactorError> {
        let poll = Poll::new().map_err(ReactorError::ResourceExhaustion)?;
        Ok(Self {
            poll,
            events: Events::with_capacity(capacity),
            acceptors: HashSet::new(),
            wake_token: None,
        })
    }

    /// Start watching `source` under `token`.
    pub fn register<S>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), ReactorError>
    where
        S: Source + ?Sized,
    {
        self.poll
            .registry()
            .register(source, token, mio::Interest::READABLE)
            .map_err(|source| ReactorError::InvalidChannel {
                token: token.0,
                source,
            })?;
        self.track(token, interest);
        Ok(())
    }

    /// Stop watching `source`. Must be called before the source is dropped.
    pub fn deregister<S>(&mut self, source: &mut S, token: Token) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.acceptors.remove(&token);
        self.poll.registry().deregister(source)
    }

    /// Create a waker that interrupts `wait_for_ready` from another thread.
    ///
    /// Wakes never show up in the ready set.
    pub fn waker(&mut self, token: Token) -> Result<Arc<Waker>, ReactorError> {
        let waker = Waker::new(self.poll.registry(), token).map_err(|source| {
            ReactorError::InvalidChannel {
                token: token.0,
                source,
            }
        })?;
        self.wake_token = Some(token);
        Ok(Arc::new(waker))
    }

    /// Block until at least one channel is ready or `timeout` elapses.
    ///
    /// `ready` is cleared first. An empty result (timeout, interrupt, wake)
    /// is normal and means the caller should simply wait again.
    pub fn wait_for_ready(
        &mut self,
        ready: &mut ReadySet,
        timeout: Option<Duration>,
    ) -> Result<(), ReactorError> {
        ready.entries.clear();

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(ReactorError::Poll(e)),
        }

        for event in self.events.iter() {
            let token = event.token();
            if Some(token) == self.wake_token {
                continue;
            }

            // Errors and hang-ups surface through the next read or accept.
            let signalled = event.is_readable() || event.is_read_closed() || event.is_error();
            if !signalled {
                continue;
            }

            let accepting = self.acceptors.contains(&token);
            ready.entries.push(Ready {
                token,
                acceptable: accepting,
                readable: !accepting,
            });
        }

        Ok(())
    }

    fn track(&mut self, token: Token, interest: Interest) {
        match interest {
            Interest::Acceptable => {
                self.acceptors.insert(token);
            }
            Interest::Readable => {
                self.acceptors.remove(&token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::{TcpListener, TcpStream};
    use std::io::Write;

    const LISTENER: Token = Token(100);
    const WAKE: Token = Token(101);
    const CONN: Token = Token(0);

    fn wait_until_nonempty(mux: &mut Multiplexer, ready: &mut ReadySet) {
        for _ in 0..50 {
            mux.wait_for_ready(ready, Some(Duration::from_millis(100)))
                .unwrap();
            if !ready.is_empty() {
                return;
            }
        }
        panic!("no readiness reported");
    }

    #[test]
    fn test_timeout_returns_empty_set() {
        let mut mux = Multiplexer::open(8).unwrap();
        let mut ready = ReadySet::with_capacity(8);
        mux.wait_for_ready(&mut ready, Some(Duration::from_millis(10)))
            .unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn test_listener_reports_acceptable() {
        let mut mux = Multiplexer::open(8).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        mux.register(&mut listener, LISTENER, Interest::Acceptable)
            .unwrap();

        let _client = std::net::TcpStream::connect(addr).unwrap();

        let mut ready = ReadySet::with_capacity(8);
        wait_until_nonempty(&mut mux, &mut ready);
        let entries: Vec<_> = ready.drain().collect();
        assert_eq!(
            entries,
            vec![Ready {
                token: LISTENER,
                acceptable: true,
                readable: false,
            }]
        );
        assert!(ready.is_empty());
    }

    #[test]
    fn test_stream_reports_readable() {
        let mut mux = Multiplexer::open(8).unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        server_side.set_nonblocking(true).unwrap();
        let mut stream = TcpStream::from_std(server_side);

        mux.register(&mut stream, CONN, Interest::Readable).unwrap();
        client.write_all(b"ping").unwrap();

        let mut ready = ReadySet::with_capacity(8);
        wait_until_nonempty(&mut mux, &mut ready);
        let entry = *ready.iter().next().unwrap();
        assert_eq!(entry.token, CONN);
        assert!(entry.readable);
        assert!(!entry.acceptable);

        mux.deregister(&mut stream, CONN).unwrap();
    }

    #[test]
    fn test_wake_yields_empty_set() {
        let mut mux = Multiplexer::open(8).unwrap();
        let waker = mux.waker(WAKE).unwrap();
        waker.wake().unwrap();

        let mut ready = ReadySet::with_capacity(8);
        mux.wait_for_ready(&mut ready, Some(Duration::from_secs(5)))
            .unwrap();
        assert!(ready.is_empty());
    }
}
