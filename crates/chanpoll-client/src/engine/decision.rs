//! Control decisions: what one cycle's outcome means for the loop.
//!
//! Kept free of I/O so the table can be tested directly. Callers publish the
//! returned events in order, then act on the decision.

use std::time::Duration;

use chanpoll_core::fault::{Fault, FaultKind};
use chanpoll_core::protocol::{Envelope, ProtocolError};

use crate::bus::EngineEvent;

/// Engine flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Keep polling until the server or the caller ends the channel.
    #[default]
    Streaming,
    /// End the session after the first payload.
    SingleExchange,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Termination {
    pub errors: Vec<ProtocolError>,
    pub by_caller: bool,
}

impl Termination {
    pub fn by_caller(errors: Vec<ProtocolError>) -> Self {
        Self {
            errors,
            by_caller: true,
        }
    }

    pub fn by_server(errors: Vec<ProtocolError>) -> Self {
        Self {
            errors,
            by_caller: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Schedule the next cycle after this delay.
    Continue(Duration),
    /// Graceful stop (terminate-notice, then hard-terminate).
    Terminate(Termination),
    /// Hard-terminate without rescheduling.
    Finalized(Termination),
}

/// Inputs besides the envelope itself.
#[derive(Debug, Clone, Copy)]
pub struct DecideContext {
    pub mode: Mode,
    /// The caller stopped the engine while this exchange was in flight.
    pub locally_terminated: bool,
    /// Floor applied to a zero poll delay.
    pub min_poll_delay: Duration,
    /// Wait after a recoverable fault escaped the retry loop.
    pub recovery_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub events: Vec<EngineEvent>,
    pub decision: Decision,
}

/// Classify a decoded response. Server-declared errors are appended to
/// `accumulated` so the final termination can report them.
pub fn decide_response(
    env: &Envelope,
    cx: DecideContext,
    accumulated: &mut Vec<ProtocolError>,
) -> Outcome {
    let mut events = Vec::new();

    if env.is_error() {
        accumulated.extend(env.errors().iter().cloned());
        events.push(EngineEvent::ServerErrors {
            trace_id: env.trace_id().to_owned(),
            errors: env.errors().to_vec(),
        });
    }

    if env.has_body() {
        events.push(EngineEvent::MessageReceived {
            trace_id: env.trace_id().to_owned(),
            body: env.body().clone(),
        });
        if cx.mode == Mode::SingleExchange && !env.is_terminated() {
            return Outcome {
                events,
                decision: Decision::Finalized(Termination::by_server(accumulated.clone())),
            };
        }
    }

    let delay = Duration::from_millis(u64::from(env.poll_delay_ms()));

    if env.is_terminated() {
        let decision = if env.is_not_ready() || env.is_empty() || cx.locally_terminated {
            Decision::Finalized(Termination {
                errors: accumulated.clone(),
                by_caller: cx.locally_terminated,
            })
        } else {
            // Backlog still non-empty: drain it with one more cycle.
            Decision::Continue(delay)
        };
        return Outcome { events, decision };
    }

    if delay.is_zero() {
        events.push(EngineEvent::InvalidMessage {
            trace_id: env.trace_id().to_owned(),
            reason: "server sent a zero poll delay".into(),
        });
        return Outcome {
            events,
            decision: Decision::Continue(cx.min_poll_delay),
        };
    }

    Outcome {
        events,
        decision: Decision::Continue(delay),
    }
}

/// Classify a fault that escaped the retry loop.
pub fn decide_fault(fault: Fault, cx: DecideContext, accumulated: &[ProtocolError]) -> Outcome {
    let decision = if fault.forces_terminate() {
        Decision::Finalized(Termination::by_server(accumulated.to_vec()))
    } else if fault.kind() == FaultKind::Server {
        Decision::Terminate(Termination::by_server(accumulated.to_vec()))
    } else {
        Decision::Continue(cx.recovery_delay)
    };
    Outcome {
        events: vec![EngineEvent::Fault(fault)],
        decision,
    }
}
