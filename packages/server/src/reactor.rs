//! The reactor: event loop, accept handling, and the buffered send path.
//!
//! One reactor thread owns the readiness multiplexer and the listening
//! socket. It blocks only in `poll`, turning every readiness event into a
//! [`WorkItem`] for the worker pool. Workers perform all socket I/O through
//! [`Core`], which holds the shared state: the connection store, both buffer
//! stores, the mailbox, and the registries.
//!
//! mio registrations are edge-triggered, so every handler drains its socket
//! until `WouldBlock` — a single notification does not repeat for data that
//! is already pending.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::PoisonError;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use hearth_shared::protocol::{FRAME_LEN, Frame};

use crate::buffer::BufferStore;
use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionStore, IoOutcome, read_chunk, write_chunk};
use crate::error::ServerError;
use crate::handler;
use crate::mailbox::Mailbox;
use crate::registry::Directory;
use crate::worker::{WorkItem, WorkQueue, WorkerPool};

/// Token of the listening socket; connection tokens start above it and are
/// never reused.
const LISTENER: usize = 0;

/// Capacity of the event batch handed back by one `poll` call.
const EVENTS_CAPACITY: usize = 1024;

/// Shared server state, owned by the reactor and visible to every worker.
pub struct Core {
    registry: mio::Registry,
    listener: TcpListener,
    next_token: AtomicUsize,
    pub(crate) connections: ConnectionStore,
    pub(crate) recv_buffers: BufferStore,
    pub(crate) send_buffers: BufferStore,
    pub(crate) mailbox: Mailbox,
    pub(crate) directory: Directory,
}

/// The event loop over a bound listening socket.
pub struct Reactor {
    poll: Poll,
    config: ServerConfig,
    local_addr: SocketAddr,
    queue: WorkQueue<WorkItem>,
    core: Arc<Core>,
}

impl Reactor {
    /// Create the listening socket and the readiness multiplexer.
    ///
    /// The socket gets `SO_REUSEADDR`, the configured backlog, and
    /// non-blocking mode before being registered for read-readiness.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let mut listener = make_listener(&addr, config.backlog)
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, Token(LISTENER), Interest::READABLE)?;
        let registry = poll.registry().try_clone()?;

        let core = Arc::new(Core {
            registry,
            listener,
            next_token: AtomicUsize::new(LISTENER + 1),
            connections: ConnectionStore::new(),
            recv_buffers: BufferStore::new(),
            send_buffers: BufferStore::new(),
            mailbox: Mailbox::new(),
            directory: Directory::new(),
        });

        Ok(Reactor {
            poll,
            config,
            local_addr,
            queue: WorkQueue::new(),
            core,
        })
    }

    /// The address the listener actually bound to (tests bind port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start the worker pool and run the event loop forever.
    pub fn run(mut self) -> Result<(), ServerError> {
        let core = Arc::clone(&self.core);
        let pool = WorkerPool::start(self.config.workers, self.queue.clone(), move |item| {
            core.handle(item)
        });
        info!(
            "listening on {} with {} workers",
            self.local_addr,
            pool.len()
        );

        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ServerError::Poll(e));
            }
            for event in &events {
                self.queue.push(work_item(event));
            }
        }
    }
}

impl Core {
    /// Execute one readiness event. Runs on a worker thread.
    pub(crate) fn handle(&self, item: WorkItem) {
        if item.token == LISTENER {
            if item.readable {
                self.handle_accept();
            }
            return;
        }

        // Stale events for already-released tokens fall through here.
        let Some(connection) = self.connections.get(item.token) else {
            return;
        };
        // Serialize all handling for this descriptor.
        let mut conn = connection.lock().unwrap_or_else(PoisonError::into_inner);
        if conn.released {
            return;
        }
        if item.readable {
            self.handle_read(&mut conn);
        }
        if item.writable && !conn.released {
            self.handle_write(&mut conn);
        }
    }

    /// Drain all pending connections off the listener.
    fn handle_accept(&self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) =
                        self.registry
                            .register(&mut stream, Token(token), Interest::READABLE)
                    {
                        warn!(%peer, "failed to register accepted connection: {e}");
                        continue;
                    }
                    self.mailbox.register(token);
                    self.connections.insert(token, Connection::new(stream, token));
                    debug!(token, %peer, "accepted connection");
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    /// Drain the socket, reassembling fixed-size frames across fragmented
    /// reads, and dispatch every complete frame.
    fn handle_read(&self, conn: &mut Connection) {
        loop {
            let buffered = self.recv_buffers.len(conn.token);
            let mut chunk = vec![0u8; FRAME_LEN - buffered];

            match read_chunk(&mut conn.stream, &mut chunk) {
                IoOutcome::Complete => {
                    let bytes = if buffered == 0 {
                        chunk
                    } else {
                        let mut assembled = self.recv_buffers.take_all(conn.token);
                        assembled.extend_from_slice(&chunk);
                        assembled
                    };
                    match Frame::from_bytes(&bytes) {
                        Ok(frame) => handler::dispatch(self, conn, frame),
                        // Unreachable: the loop always requests exactly the
                        // missing byte count.
                        Err(e) => debug!(token = conn.token, "dropping malformed frame: {e}"),
                    }
                    if conn.released {
                        return;
                    }
                }
                IoOutcome::Partial(n) => {
                    self.recv_buffers.append(conn.token, &chunk[..n]);
                }
                IoOutcome::WouldBlock => return,
                IoOutcome::Closed => {
                    debug!(token = conn.token, "peer closed connection");
                    self.release(conn);
                    return;
                }
                IoOutcome::Fatal(e) => {
                    warn!(token = conn.token, "read failed: {e}");
                    self.release(conn);
                    return;
                }
            }
        }
    }

    /// Flush buffered bytes on write-readiness.
    fn handle_write(&self, conn: &mut Connection) {
        self.flush(conn);
    }

    /// Send a reply, buffering whatever the socket will not take right now.
    ///
    /// Any bytes already waiting are flushed first so ordering is preserved;
    /// if the socket still will not drain, the new bytes queue behind them.
    pub(crate) fn send_bytes(&self, conn: &mut Connection, data: &[u8]) {
        if !self.send_buffers.is_empty(conn.token) {
            self.flush(conn);
            if conn.released {
                return;
            }
            if !self.send_buffers.is_empty(conn.token) {
                self.send_buffers.append(conn.token, data);
                self.set_interest(conn, Interest::READABLE | Interest::WRITABLE);
                return;
            }
        }

        match write_chunk(&mut conn.stream, data) {
            IoOutcome::Complete => {}
            IoOutcome::Partial(n) => {
                self.send_buffers.append(conn.token, &data[n..]);
                self.set_interest(conn, Interest::READABLE | Interest::WRITABLE);
            }
            IoOutcome::WouldBlock => {
                self.send_buffers.append(conn.token, data);
                self.set_interest(conn, Interest::READABLE | Interest::WRITABLE);
            }
            IoOutcome::Closed => {
                debug!(token = conn.token, "peer closed connection mid-send");
                self.release(conn);
            }
            IoOutcome::Fatal(e) => {
                warn!(token = conn.token, "send failed: {e}");
                self.release(conn);
            }
        }
    }

    /// Write the buffered bytes out until done or the socket blocks again.
    ///
    /// On a full flush the registration drops back to read-readiness only.
    fn flush(&self, conn: &mut Connection) {
        loop {
            let pending = self.send_buffers.take_all(conn.token);
            if pending.is_empty() {
                self.set_interest(conn, Interest::READABLE);
                return;
            }
            match write_chunk(&mut conn.stream, &pending) {
                IoOutcome::Complete => {
                    self.set_interest(conn, Interest::READABLE);
                    return;
                }
                IoOutcome::Partial(n) => {
                    self.send_buffers.append(conn.token, &pending[n..]);
                }
                IoOutcome::WouldBlock => {
                    self.send_buffers.append(conn.token, &pending);
                    self.set_interest(conn, Interest::READABLE | Interest::WRITABLE);
                    return;
                }
                IoOutcome::Closed => {
                    debug!(token = conn.token, "peer closed connection mid-flush");
                    self.release(conn);
                    return;
                }
                IoOutcome::Fatal(e) => {
                    warn!(token = conn.token, "flush failed: {e}");
                    self.release(conn);
                    return;
                }
            }
        }
    }

    /// Update the multiplexer registration if the interest set changed.
    fn set_interest(&self, conn: &mut Connection, interest: Interest) {
        if conn.interest == interest {
            return;
        }
        match self
            .registry
            .reregister(&mut conn.stream, Token(conn.token), interest)
        {
            Ok(()) => conn.interest = interest,
            Err(e) => warn!(token = conn.token, "reregister failed: {e}"),
        }
    }

    /// Tear a connection down: deregister, mark the owning account offline,
    /// and discard its buffers and mailbox. Idempotent; the terminal state
    /// of every connection, reached from exactly this one entry point.
    pub(crate) fn release(&self, conn: &mut Connection) {
        if conn.released {
            return;
        }
        conn.released = true;

        if let Err(e) = self.registry.deregister(&mut conn.stream) {
            debug!(token = conn.token, "deregister failed: {e}");
        }
        self.directory.sessions.mark_offline(conn.token);
        self.recv_buffers.remove(conn.token);
        self.send_buffers.remove(conn.token);
        self.mailbox.remove(conn.token);
        // The socket closes when the last Arc reference drops.
        self.connections.remove(conn.token);
        debug!(token = conn.token, "connection released");
    }
}

/// Translate one readiness event into work for the pool.
///
/// Error and hangup conditions fold into the readable flag: a read on such a
/// socket observes `Closed` or `Fatal` and releases the connection, instead
/// of the descriptor lingering registered until the peer sends bytes.
fn work_item(event: &mio::event::Event) -> WorkItem {
    WorkItem {
        token: event.token().0,
        readable: event.is_readable() || event.is_read_closed() || event.is_error(),
        writable: event.is_writable(),
    }
}

/// Build the non-blocking listening socket with `SO_REUSEADDR` and an
/// explicit backlog, then hand it to mio.
fn make_listener(addr: &str, backlog: i32) -> std::io::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;

    Ok(TcpListener::from_std(socket.into()))
}
