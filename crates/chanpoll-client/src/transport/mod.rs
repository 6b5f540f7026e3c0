//! Transport layer (HTTP exchange collaborator).
//!
//! The engine only needs "POST these bytes to this route and give me the
//! status and body back". Cancellation and the per-request deadline are
//! applied around the collaborator by [`send_abortable`], so implementations
//! stay simple.

#[cfg(feature = "http")]
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::{AbortRegistration, Abortable};
use thiserror::Error;

use chanpoll_core::fault::{Classify, Fault};

/// Per-request options.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    pub timeout: Duration,
    /// Hint that the request should outlive its caller (terminate-notice).
    pub keep_alive: bool,
}

/// A completed HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Lowercase header names.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure of a single exchange before a status was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    TimedOut,
    #[error("request aborted")]
    Aborted,
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_abort(&self) -> bool {
        matches!(self, TransportError::Aborted)
    }
}

impl Classify for TransportError {
    fn classify(&self) -> Fault {
        match self {
            TransportError::Connect(msg) => Fault::Connection(msg.clone()),
            TransportError::TimedOut => Fault::Timeout,
            TransportError::Aborted | TransportError::Other(_) => Fault::Unknown(self.to_string()),
        }
    }
}

/// Request transport collaborator.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        route: &str,
        body: Bytes,
        opts: SendOptions,
    ) -> std::result::Result<HttpResponse, TransportError>;
}

/// Run one exchange under the per-request deadline, abortable through
/// `registration`.
pub(crate) async fn send_abortable(
    transport: &dyn Transport,
    route: &str,
    body: Bytes,
    opts: SendOptions,
    registration: AbortRegistration,
) -> std::result::Result<HttpResponse, TransportError> {
    let call = tokio::time::timeout(opts.timeout, transport.send(route, body, opts));
    match Abortable::new(call, registration).await {
        Err(_aborted) => Err(TransportError::Aborted),
        Ok(Err(_elapsed)) => Err(TransportError::TimedOut),
        Ok(Ok(res)) => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanpoll_core::fault::FaultKind;

    #[test]
    fn transport_errors_classify() {
        assert_eq!(
            TransportError::Connect("refused".into()).classify().kind(),
            FaultKind::Connection
        );
        assert_eq!(TransportError::TimedOut.classify(), Fault::Timeout);
        assert_eq!(
            TransportError::Other("tls".into()).classify().kind(),
            FaultKind::Unknown
        );
    }

    #[test]
    fn only_2xx_is_success() {
        assert!(HttpResponse::new(200, Bytes::new()).is_success());
        assert!(HttpResponse::new(204, Bytes::new()).is_success());
        assert!(!HttpResponse::new(304, Bytes::new()).is_success());
        assert!(!HttpResponse::new(500, Bytes::new()).is_success());
    }
}
