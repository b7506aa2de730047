//! Standard input to socket relay.
//!
//! Companion to the server: reads whatever stdin yields, at most one chunk at
//! a time, and writes it to the connection unchanged. No handshake, no reply.

use crate::config::ClientArgs;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use tracing::{info, trace};

/// Copy `input` to `output` chunk by chunk until `input` reaches EOF.
///
/// Only the bytes each read returned are written. Returns the byte count.
pub fn relay<R, W>(input: &mut R, output: &mut W, chunk_size: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    if chunk_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "chunk size must be greater than zero",
        ));
    }

    let mut chunk = vec![0u8; chunk_size];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        output.write_all(&chunk[..n])?;
        output.flush()?;
        trace!(bytes = n, "Relayed chunk");
        total += n as u64;
    }
    Ok(total)
}

/// Connect to the server and relay stdin until it closes, then half-close.
pub fn run(args: &ClientArgs) -> io::Result<u64> {
    let mut stream = TcpStream::connect(args.connect)?;
    info!(server = %args.connect, "Connected");

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let total = relay(&mut input, &mut stream, args.chunk_size)?;

    stream.shutdown(Shutdown::Write)?;
    info!(bytes = total, "Input closed, disconnecting");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::runtime::{ChannelSink, EventLoop, SinkEvent};
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// Writer that records the size of every write call.
    #[derive(Default)]
    struct RecordingWriter {
        data: Vec<u8>,
        writes: Vec<usize>,
    }

    impl Write for RecordingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            self.writes.push(buf.len());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_relay_writes_only_bytes_read() {
        let mut input = Cursor::new(b"hello\nworld\n".to_vec());
        let mut output = RecordingWriter::default();

        let total = relay(&mut input, &mut output, 5).unwrap();

        assert_eq!(total, 12);
        assert_eq!(output.data, b"hello\nworld\n");
        assert_eq!(output.writes, vec![5, 5, 2]);
    }

    #[test]
    fn test_relay_empty_input() {
        let mut output = RecordingWriter::default();
        let total = relay(&mut io::empty(), &mut output, 16).unwrap();
        assert_eq!(total, 0);
        assert!(output.writes.is_empty());
    }

    #[test]
    fn test_relay_rejects_zero_chunk() {
        let mut output = Vec::new();
        let err = relay(&mut io::empty(), &mut output, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_relay_into_event_loop() {
        let config = Config {
            listen: "127.0.0.1:0".parse().unwrap(),
            ..Config::default()
        };
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let server = thread::spawn(move || {
            let mut event_loop = EventLoop::bind(&config, ChannelSink::new(tx)).unwrap();
            ready_tx
                .send((event_loop.local_addr(), event_loop.shutdown_handle()))
                .unwrap();
            event_loop.run().unwrap();
        });
        let (addr, shutdown) = ready_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let mut stream = TcpStream::connect(addr).unwrap();
        let mut input = Cursor::new(b"first line\nsecond line\n".to_vec());
        relay(&mut input, &mut stream, 8).unwrap();
        stream.shutdown(Shutdown::Write).unwrap();

        let mut received = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                SinkEvent::Data { payload, .. } => received.extend_from_slice(&payload),
                SinkEvent::Closed { .. } => break,
            }
        }

        // Read boundaries decide where trimming applies, so compare without
        // whitespace.
        let visible: Vec<u8> = received
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        assert_eq!(visible, b"firstlinesecondline");

        shutdown.shutdown();
        server.join().unwrap();
    }
}
