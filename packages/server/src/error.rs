//! Error types for the Hearth chat server.

use std::io;

use thiserror::Error;

/// Server-level failures.
///
/// Only unrecoverable setup problems surface here; per-connection I/O errors
/// are absorbed by releasing the connection, and protocol-level failures are
/// reported to the requester as result codes.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be created or bound.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    /// The readiness multiplexer failed.
    #[error("polling failure: {0}")]
    Poll(#[from] io::Error),
}
