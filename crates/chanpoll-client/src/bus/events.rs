use bytes::Bytes;

use chanpoll_core::fault::{Fault, FaultKind};
use chanpoll_core::protocol::ProtocolError;

use super::BusEvent;

/// Externally visible engine transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A poll returned a non-empty body.
    MessageReceived { trace_id: String, body: Bytes },
    /// The session ended. `by_caller` is false when the server (or a fault) ended it.
    Terminated {
        errors: Vec<ProtocolError>,
        by_caller: bool,
    },
    /// Errors the server declared inside an envelope.
    ServerErrors {
        trace_id: String,
        errors: Vec<ProtocolError>,
    },
    /// A classified transport/protocol fault.
    Fault(Fault),
    ReconnectStarted { attempt: u32 },
    ReconnectSucceeded { attempt: u32 },
    ReconnectFailed { attempt: u32, fault: Fault },
    /// The server broke the pacing contract or sent something unexpected.
    InvalidMessage { trace_id: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageReceived,
    Terminated,
    ServerErrors,
    ConnectionFault,
    TimeoutFault,
    ServerFault,
    UnknownFault,
    ReconnectStarted,
    ReconnectSucceeded,
    ReconnectFailed,
    InvalidMessage,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::MessageReceived,
        EventKind::Terminated,
        EventKind::ServerErrors,
        EventKind::ConnectionFault,
        EventKind::TimeoutFault,
        EventKind::ServerFault,
        EventKind::UnknownFault,
        EventKind::ReconnectStarted,
        EventKind::ReconnectSucceeded,
        EventKind::ReconnectFailed,
        EventKind::InvalidMessage,
    ];

    pub const FAULTS: [EventKind; 4] = [
        EventKind::ConnectionFault,
        EventKind::TimeoutFault,
        EventKind::ServerFault,
        EventKind::UnknownFault,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MessageReceived => "message_received",
            EventKind::Terminated => "terminated",
            EventKind::ServerErrors => "server_errors",
            EventKind::ConnectionFault => "connection_fault",
            EventKind::TimeoutFault => "timeout_fault",
            EventKind::ServerFault => "server_fault",
            EventKind::UnknownFault => "unknown_fault",
            EventKind::ReconnectStarted => "reconnect_started",
            EventKind::ReconnectSucceeded => "reconnect_succeeded",
            EventKind::ReconnectFailed => "reconnect_failed",
            EventKind::InvalidMessage => "invalid_message",
        }
    }
}

impl From<FaultKind> for EventKind {
    fn from(kind: FaultKind) -> Self {
        match kind {
            FaultKind::Connection => EventKind::ConnectionFault,
            FaultKind::Timeout => EventKind::TimeoutFault,
            FaultKind::Server => EventKind::ServerFault,
            FaultKind::Unknown => EventKind::UnknownFault,
        }
    }
}

impl BusEvent for EngineEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            EngineEvent::MessageReceived { .. } => EventKind::MessageReceived,
            EngineEvent::Terminated { .. } => EventKind::Terminated,
            EngineEvent::ServerErrors { .. } => EventKind::ServerErrors,
            EngineEvent::Fault(f) => f.kind().into(),
            EngineEvent::ReconnectStarted { .. } => EventKind::ReconnectStarted,
            EngineEvent::ReconnectSucceeded { .. } => EventKind::ReconnectSucceeded,
            EngineEvent::ReconnectFailed { .. } => EventKind::ReconnectFailed,
            EngineEvent::InvalidMessage { .. } => EventKind::InvalidMessage,
        }
    }
}
