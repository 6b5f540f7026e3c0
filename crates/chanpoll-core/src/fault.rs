//! Fault classification for transport and protocol failures.
//!
//! Every failure the poll loop can observe is folded into a [`Fault`]. The
//! only decision the retry integration reads from it is
//! [`Fault::is_recoverable`]; [`Fault::forces_terminate`] marks faults that end
//! the whole session.

use thiserror::Error;

use crate::error::ChanpollError;

/// Closed set of fault categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Connection,
    Timeout,
    Server,
    Unknown,
}

impl FaultKind {
    /// Machine-readable code.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultKind::Connection => "CONNECTION",
            FaultKind::Timeout => "TIMEOUT",
            FaultKind::Server => "SERVER",
            FaultKind::Unknown => "UNKNOWN",
        }
    }
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// Network or DNS level failure.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The configured per-request deadline elapsed.
    #[error("request timed out")]
    Timeout,
    /// The exchange completed with a failing status (`None` when unknown).
    #[error("server fault (status {})", display_status(.status))]
    Server { status: Option<u16> },
    /// Anything else. Treated as a defect, not a transient condition.
    #[error("unknown fault: {0}")]
    Unknown(String),
}

impl Fault {
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::Connection(_) => FaultKind::Connection,
            Fault::Timeout => FaultKind::Timeout,
            Fault::Server { .. } => FaultKind::Server,
            Fault::Unknown(_) => FaultKind::Unknown,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Whether another attempt is worth making.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Fault::Connection(_) | Fault::Timeout => true,
            Fault::Server { status } => status.map_or(true, |s| s < 400),
            Fault::Unknown(_) => false,
        }
    }

    /// Whether this fault hard-terminates the session.
    pub fn forces_terminate(&self) -> bool {
        matches!(self, Fault::Unknown(_))
    }

    /// Fault for a completed exchange that returned `status`.
    pub fn from_status(status: u16) -> Self {
        Fault::Server {
            status: Some(status),
        }
    }
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "unknown".to_string(), |s| s.to_string())
}

/// Conversion of a caught failure into a [`Fault`].
pub trait Classify {
    fn classify(&self) -> Fault;
}

impl Classify for ChanpollError {
    /// Codec and internal errors have no transient interpretation.
    fn classify(&self) -> Fault {
        Fault::Unknown(self.to_string())
    }
}

impl Classify for Fault {
    fn classify(&self) -> Fault {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability_table() {
        assert!(Fault::Connection("dns".into()).is_recoverable());
        assert!(Fault::Timeout.is_recoverable());
        assert!(Fault::Server { status: None }.is_recoverable());
        assert!(Fault::from_status(302).is_recoverable());
        assert!(!Fault::from_status(400).is_recoverable());
        assert!(!Fault::from_status(500).is_recoverable());
        assert!(!Fault::Unknown("boom".into()).is_recoverable());
    }

    #[test]
    fn only_unknown_forces_terminate() {
        assert!(Fault::Unknown("boom".into()).forces_terminate());
        assert!(!Fault::from_status(503).forces_terminate());
        assert!(!Fault::Timeout.forces_terminate());
    }

    #[test]
    fn codec_errors_classify_as_unknown() {
        let f = ChanpollError::BadRequest("bad frame".into()).classify();
        assert_eq!(f.kind(), FaultKind::Unknown);
        assert_eq!(f.code(), "UNKNOWN");
    }

    #[test]
    fn server_fault_display() {
        assert_eq!(Fault::from_status(502).to_string(), "server fault (status 502)");
        assert_eq!(
            Fault::Server { status: None }.to_string(),
            "server fault (status unknown)"
        );
    }
}
