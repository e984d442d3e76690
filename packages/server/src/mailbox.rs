//! Per-connection outbound mailboxes.
//!
//! Chat delivery never writes to another connection's socket directly — that
//! would interleave with the recipient's own read/write cycle. Instead each
//! delivery is queued in the recipient's mailbox, and the recipient polls it
//! with the `getmsg` command. The queue is an unbounded FIFO: no pending
//! message is ever overwritten, and messages are retrieved in delivery
//! order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use hearth_shared::protocol::Frame;

/// FIFO queues of pending frames, keyed by connection token.
///
/// Queues exist exactly as long as their connection: [`register`](Self::register)
/// creates one at accept time, [`remove`](Self::remove) deletes it at release.
/// A delivery racing a release therefore lands on a missing entry and is
/// dropped instead of resurrecting a queue for a dead token.
#[derive(Default)]
pub struct Mailbox {
    inner: Mutex<HashMap<usize, VecDeque<Frame>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, VecDeque<Frame>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty queue for a newly accepted connection.
    pub fn register(&self, token: usize) {
        self.lock().entry(token).or_default();
    }

    /// Queue a frame for the connection identified by `token`. Dropped when
    /// the token is no longer registered.
    pub fn deliver(&self, token: usize, frame: Frame) {
        if let Some(queue) = self.lock().get_mut(&token) {
            queue.push_back(frame);
        }
    }

    /// Remove and return the oldest pending frame, if any.
    pub fn collect(&self, token: usize) -> Option<Frame> {
        self.lock().get_mut(&token).and_then(VecDeque::pop_front)
    }

    /// Number of frames pending for `token`.
    pub fn pending(&self, token: usize) -> usize {
        self.lock().get(&token).map_or(0, VecDeque::len)
    }

    /// Discard the queue for `token` entirely (connection released).
    pub fn remove(&self, token: usize) {
        self.lock().remove(&token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(payload: &str) -> Frame {
        Frame::new("sgchat", "alice", payload).unwrap()
    }

    #[test]
    fn empty_mailbox_yields_nothing() {
        let mailbox = Mailbox::new();
        mailbox.register(1);
        assert_eq!(mailbox.collect(1), None);
        assert_eq!(mailbox.pending(1), 0);
    }

    #[test]
    fn messages_are_retrieved_in_delivery_order() {
        let mailbox = Mailbox::new();
        mailbox.register(1);
        mailbox.deliver(1, chat("first"));
        mailbox.deliver(1, chat("second"));
        assert_eq!(mailbox.pending(1), 2);

        assert_eq!(mailbox.collect(1).unwrap().payload(), "first");
        assert_eq!(mailbox.collect(1).unwrap().payload(), "second");
        assert_eq!(mailbox.collect(1), None);
    }

    #[test]
    fn queues_are_independent_per_token() {
        let mailbox = Mailbox::new();
        mailbox.register(1);
        mailbox.register(2);
        mailbox.deliver(1, chat("for one"));
        mailbox.deliver(2, chat("for two"));

        assert_eq!(mailbox.collect(2).unwrap().payload(), "for two");
        assert_eq!(mailbox.collect(1).unwrap().payload(), "for one");
    }

    #[test]
    fn remove_discards_pending_messages() {
        let mailbox = Mailbox::new();
        mailbox.register(1);
        mailbox.deliver(1, chat("lost on release"));
        mailbox.remove(1);
        assert_eq!(mailbox.collect(1), None);
    }

    #[test]
    fn delivery_after_removal_does_not_resurrect_the_queue() {
        let mailbox = Mailbox::new();
        mailbox.register(1);
        mailbox.remove(1);

        // A sender that resolved the token before the connection was torn
        // down must not leave state behind for the dead, never-reused token.
        mailbox.deliver(1, chat("too late"));
        assert_eq!(mailbox.pending(1), 0);
        assert_eq!(mailbox.collect(1), None);
        assert!(mailbox.lock().is_empty());
    }
}
