//! Shared building blocks for the Hearth chat application.
//!
//! This crate defines the fixed-size binary wire protocol spoken between the
//! Hearth server and its clients, together with the logging setup helper used
//! by both binaries.

pub mod logger;
pub mod protocol;
