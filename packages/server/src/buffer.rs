//! Per-connection byte buffers.
//!
//! Non-blocking sockets hand data over in arbitrary pieces: a read may stop
//! short of a full frame, a write may stop short of a full reply. Each
//! connection therefore owns two byte queues — one holding a partially
//! received frame, one holding bytes waiting for the socket to become
//! writable again. Both live in a [`BufferStore`] keyed by connection token.
//!
//! The store's own lock makes each operation atomic; consistency of a single
//! connection's buffer across multiple operations comes from the
//! per-connection serialization in the reactor (only one handler is ever
//! active for a given connection).

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Byte queues for a set of connections, keyed by token.
#[derive(Default)]
pub struct BufferStore {
    inner: Mutex<HashMap<usize, Vec<u8>>>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, Vec<u8>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a buffer exists for `token` (created lazily by [`add`](Self::add)).
    pub fn exists(&self, token: usize) -> bool {
        self.lock().contains_key(&token)
    }

    /// Whether the buffer for `token` is absent or holds no bytes.
    pub fn is_empty(&self, token: usize) -> bool {
        self.lock().get(&token).map_or(true, |buf| buf.is_empty())
    }

    /// Create an empty buffer for `token` if none exists yet.
    pub fn add(&self, token: usize) {
        self.lock().entry(token).or_default();
    }

    /// Append bytes to the buffer for `token`, creating it if needed.
    pub fn append(&self, token: usize, bytes: &[u8]) {
        self.lock()
            .entry(token)
            .or_default()
            .extend_from_slice(bytes);
    }

    /// Remove and return every buffered byte for `token`.
    pub fn take_all(&self, token: usize) -> Vec<u8> {
        self.lock()
            .get_mut(&token)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Number of bytes buffered for `token`.
    pub fn len(&self, token: usize) -> usize {
        self.lock().get(&token).map_or(0, Vec::len)
    }

    /// Drop the buffered bytes for `token` but keep the entry.
    pub fn clear(&self, token: usize) {
        if let Some(buf) = self.lock().get_mut(&token) {
            buf.clear();
        }
    }

    /// Discard the buffer for `token` entirely (connection released).
    pub fn remove(&self, token: usize) {
        self.lock().remove(&token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_created_lazily() {
        let store = BufferStore::new();
        assert!(!store.exists(1));
        assert!(store.is_empty(1));
        assert_eq!(store.len(1), 0);

        store.add(1);
        assert!(store.exists(1));
        assert!(store.is_empty(1));
    }

    #[test]
    fn append_and_take_all_round_trip() {
        let store = BufferStore::new();
        store.append(7, b"hel");
        store.append(7, b"lo");
        assert_eq!(store.len(7), 5);
        assert!(!store.is_empty(7));

        assert_eq!(store.take_all(7), b"hello");
        assert!(store.is_empty(7));
        // The entry survives a take.
        assert!(store.exists(7));
    }

    #[test]
    fn buffers_are_independent_per_token() {
        let store = BufferStore::new();
        store.append(1, b"aaa");
        store.append(2, b"bb");

        assert_eq!(store.len(1), 3);
        assert_eq!(store.len(2), 2);

        store.clear(1);
        assert!(store.is_empty(1));
        assert_eq!(store.len(2), 2);
    }

    #[test]
    fn remove_discards_the_entry() {
        let store = BufferStore::new();
        store.append(3, b"xyz");
        store.remove(3);
        assert!(!store.exists(3));
        assert_eq!(store.take_all(3), Vec::<u8>::new());
    }
}
