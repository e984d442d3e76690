//! Connection state and non-blocking socket primitives.
//!
//! [`read_chunk`] and [`write_chunk`] wrap one non-blocking socket operation
//! each and map its result into the uniform [`IoOutcome`], so the
//! edge-triggered drain loops in the reactor can branch on variants instead
//! of platform errno values. Interrupted calls are retried transparently.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mio::Interest;
use mio::net::TcpStream;

/// Result of a single non-blocking read or write attempt.
#[derive(Debug)]
pub enum IoOutcome {
    /// The requested byte count was transferred in full.
    Complete,
    /// Only the first `n` bytes were transferred.
    Partial(usize),
    /// The socket has no data/capacity right now; retry on the next
    /// readiness notification.
    WouldBlock,
    /// The peer closed the connection.
    Closed,
    /// An unrecoverable socket error; the connection must be released.
    Fatal(io::Error),
}

/// Attempt one read of exactly `buf.len()` bytes.
///
/// `buf` must be non-empty; on [`IoOutcome::Partial`] the first `n` bytes of
/// `buf` hold the data read.
pub fn read_chunk(stream: &mut TcpStream, buf: &mut [u8]) -> IoOutcome {
    loop {
        match stream.read(buf) {
            Ok(0) => return IoOutcome::Closed,
            Ok(n) if n == buf.len() => return IoOutcome::Complete,
            Ok(n) => return IoOutcome::Partial(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return IoOutcome::WouldBlock,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return IoOutcome::Fatal(e),
        }
    }
}

/// Attempt one write of `data`, which must be non-empty.
pub fn write_chunk(stream: &mut TcpStream, data: &[u8]) -> IoOutcome {
    loop {
        match stream.write(data) {
            Ok(0) => return IoOutcome::Closed,
            Ok(n) if n == data.len() => return IoOutcome::Complete,
            Ok(n) => return IoOutcome::Partial(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return IoOutcome::WouldBlock,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return IoOutcome::Fatal(e),
        }
    }
}

/// One accepted client connection.
pub struct Connection {
    pub stream: TcpStream,
    pub token: usize,
    /// Readiness interest currently registered with the multiplexer.
    pub interest: Interest,
    /// Set once by `release`; makes release idempotent.
    pub released: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, token: usize) -> Self {
        Connection {
            stream,
            token,
            interest: Interest::READABLE,
            released: false,
        }
    }
}

/// Live connections keyed by token.
///
/// Each connection sits behind its own mutex: a worker holds that lock for
/// the whole of its read or write handling, so at most one handler is ever
/// active per descriptor even when the multiplexer reports overlapping
/// events. The outer map lock is only held long enough to clone the `Arc`.
#[derive(Default)]
pub struct ConnectionStore {
    inner: Mutex<HashMap<usize, Arc<Mutex<Connection>>>>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, Arc<Mutex<Connection>>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, token: usize, connection: Connection) {
        self.lock().insert(token, Arc::new(Mutex::new(connection)));
    }

    pub fn get(&self, token: usize) -> Option<Arc<Mutex<Connection>>> {
        self.lock().get(&token).cloned()
    }

    pub fn remove(&self, token: usize) -> Option<Arc<Mutex<Connection>>> {
        self.lock().remove(&token)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener as StdListener;
    use std::thread;
    use std::time::Duration;

    /// Build a connected non-blocking mio stream plus its blocking peer.
    fn socket_pair() -> (TcpStream, std::net::TcpStream) {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = std::net::TcpStream::connect(addr).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        (TcpStream::from_std(accepted), peer)
    }

    #[test]
    fn read_reports_would_block_on_an_idle_socket() {
        let (mut stream, _peer) = socket_pair();
        let mut buf = [0u8; 16];
        assert!(matches!(
            read_chunk(&mut stream, &mut buf),
            IoOutcome::WouldBlock
        ));
    }

    #[test]
    fn read_reports_partial_and_complete_counts() {
        use std::io::Write as _;

        let (mut stream, mut peer) = socket_pair();
        peer.write_all(b"abc").unwrap();
        peer.flush().unwrap();
        thread::sleep(Duration::from_millis(100));

        let mut buf = [0u8; 8];
        match read_chunk(&mut stream, &mut buf) {
            IoOutcome::Partial(3) => assert_eq!(&buf[..3], b"abc"),
            other => panic!("expected Partial(3), got {other:?}"),
        }

        peer.write_all(b"defgh").unwrap();
        peer.flush().unwrap();
        thread::sleep(Duration::from_millis(100));

        let mut rest = [0u8; 5];
        assert!(matches!(
            read_chunk(&mut stream, &mut rest),
            IoOutcome::Complete
        ));
        assert_eq!(&rest, b"defgh");
    }

    #[test]
    fn read_reports_closed_when_the_peer_disconnects() {
        let (mut stream, peer) = socket_pair();
        drop(peer);
        thread::sleep(Duration::from_millis(100));

        let mut buf = [0u8; 4];
        assert!(matches!(read_chunk(&mut stream, &mut buf), IoOutcome::Closed));
    }

    #[test]
    fn write_completes_against_a_draining_peer() {
        let (mut stream, peer) = socket_pair();
        assert!(matches!(
            write_chunk(&mut stream, b"hello"),
            IoOutcome::Complete
        ));
        drop(peer);
    }

    #[test]
    fn store_hands_out_shared_connections() {
        let (stream, _peer) = socket_pair();
        let store = ConnectionStore::new();
        store.insert(5, Connection::new(stream, 5));

        assert_eq!(store.len(), 1);
        let first = store.get(5).unwrap();
        let second = store.get(5).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(store.remove(5).is_some());
        assert!(store.get(5).is_none());
        assert!(store.is_empty());
    }
}
