//! Hearth chat server.
//!
//! A single-process chat server built around a reactor event loop: one
//! thread blocks on an edge-triggered readiness multiplexer and feeds a
//! fixed pool of worker threads that perform all non-blocking socket I/O,
//! reassemble the fixed-size binary frames of the wire protocol, and mutate
//! the shared session/room registries under an explicit session-before-room
//! lock order.

pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod mailbox;
pub mod reactor;
pub mod registry;
pub mod worker;

mod handler;

pub use config::ServerConfig;
pub use error::ServerError;
pub use reactor::Reactor;
