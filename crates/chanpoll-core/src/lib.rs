//! chanpoll core: transport-agnostic envelope codecs, error types, and the
//! fault classifier.
//!
//! This crate defines the wire-level contracts and error surface shared by the
//! polling client and any server-side tooling. It carries no transport or
//! runtime dependencies so it can be reused in multiple contexts.
//!
//! Panics, `unwrap`, and `expect` are compile-denied here. All fallible paths
//! surface as `ChanpollError`/`Result` so a misbehaving server cannot crash
//! the host process.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod fault;
pub mod protocol;

/// Shared result type.
pub use error::{ChanpollError, Result};
pub use fault::{Fault, FaultKind};
pub use protocol::{Envelope, ErrorKind, ProtocolError, WireFormat};
