//! Protocol modules (JSON lane + binary lane).
//!
//! Both lanes carry the same [`Envelope`]; which one is used is a per-engine
//! configuration choice. All parsers are panic-free: malformed input is
//! reported as `ChanpollError` instead of panicking or indexing raw buffers.

pub mod binary;
pub mod envelope;
pub mod json;

use serde::Deserialize;

pub use envelope::{Envelope, ErrorKind, ProtocolError};

/// Wire encoding used for envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Json,
    Binary,
}

impl WireFormat {
    /// HTTP content type for request bodies in this format.
    pub fn content_type(self) -> &'static str {
        match self {
            WireFormat::Json => "application/json",
            WireFormat::Binary => "application/octet-stream",
        }
    }
}
