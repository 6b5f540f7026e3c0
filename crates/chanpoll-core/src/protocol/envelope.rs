//! Channel envelope: a small header plus an opaque payload.
//!
//! Envelopes built for sending are mutated only through the named setters
//! below; every exchange builds a fresh one. Decoded envelopes are handed out
//! by value and only read through accessors.

use bytes::Bytes;

use crate::error::Result;

use super::{binary, json, WireFormat};

/// Server-declared error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKind {
    #[default]
    Unclassified,
    TransportProtocolSpecific,
}

impl ErrorKind {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            ErrorKind::Unclassified => 0,
            ErrorKind::TransportProtocolSpecific => 1,
        }
    }

    /// Unknown discriminants decode as `Unclassified`. Takes `u32` because the
    /// JSON lane does not bound the field to a byte.
    pub(crate) fn from_wire(v: u32) -> Self {
        match v {
            0 => ErrorKind::Unclassified,
            1 => ErrorKind::TransportProtocolSpecific,
            other => {
                tracing::debug!(kind = other, "unknown error kind, decoding as unclassified");
                ErrorKind::Unclassified
            }
        }
    }
}

/// An error surfaced by the server inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    kind: ErrorKind,
    code: u32,
    message: String,
}

impl ProtocolError {
    pub fn new(kind: ErrorKind, code: u32, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}/{}] {}", self.kind, self.code, self.message)
    }
}

/// Wire message exchanged on every poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub(crate) channel_id: String,
    pub(crate) trace_id: String,
    pub(crate) route_name: String,
    pub(crate) not_ready: bool,
    pub(crate) terminated: bool,
    pub(crate) empty: bool,
    pub(crate) error: bool,
    pub(crate) errors: Vec<ProtocolError>,
    pub(crate) poll_delay_ms: u32,
    pub(crate) body: Bytes,
}

impl Envelope {
    /// Empty envelope addressed to `route_name`.
    pub fn new(route_name: impl Into<String>) -> Self {
        Self {
            route_name: route_name.into(),
            ..Self::default()
        }
    }

    /// Encode for the wire in the given format.
    pub fn encode(&self, format: WireFormat) -> Result<Bytes> {
        match format {
            WireFormat::Json => json::encode(self),
            WireFormat::Binary => binary::encode(self),
        }
    }

    /// Decode a wire message. Missing optional fields take their defaults.
    pub fn decode(buf: Bytes, format: WireFormat) -> Result<Self> {
        match format {
            WireFormat::Json => json::decode(&buf),
            WireFormat::Binary => binary::decode(buf),
        }
    }

    // ---- accessors

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn route_name(&self) -> &str {
        &self.route_name
    }

    pub fn is_not_ready(&self) -> bool {
        self.not_ready
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn errors(&self) -> &[ProtocolError] {
        &self.errors
    }

    pub fn poll_delay_ms(&self) -> u32 {
        self.poll_delay_ms
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    // ---- setters

    pub fn set_channel_id(&mut self, channel_id: impl Into<String>) -> &mut Self {
        self.channel_id = channel_id.into();
        self
    }

    pub fn set_trace_id(&mut self, trace_id: impl Into<String>) -> &mut Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn set_not_ready(&mut self, not_ready: bool) -> &mut Self {
        self.not_ready = not_ready;
        self
    }

    pub fn set_terminated(&mut self, terminated: bool) -> &mut Self {
        self.terminated = terminated;
        self
    }

    pub fn set_empty(&mut self, empty: bool) -> &mut Self {
        self.empty = empty;
        self
    }

    /// Replace the carried errors. `is_error` follows the list.
    pub fn set_errors(&mut self, errors: Vec<ProtocolError>) -> &mut Self {
        self.error = !errors.is_empty();
        self.errors = errors;
        self
    }

    pub fn set_poll_delay_ms(&mut self, poll_delay_ms: u32) -> &mut Self {
        self.poll_delay_ms = poll_delay_ms;
        self
    }

    /// Attach a payload. A body-carrying envelope is never a pure poll.
    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = body.into();
        if !self.body.is_empty() {
            self.not_ready = false;
        }
        self
    }
}
