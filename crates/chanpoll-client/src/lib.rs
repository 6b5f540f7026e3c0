//! chanpoll client library.
//!
//! Wires the envelope codec from `chanpoll-core` to a transport, a retry
//! policy and an event bus, producing a long-polling engine that looks like a
//! continuous event stream to its subscribers. Used by the `chanpoll-tail`
//! binary and by integration tests.

pub mod bus;
pub mod config;
pub mod engine;
pub mod obs;
pub mod retry;
pub mod transport;

pub use bus::{EngineEvent, EventKind, Subscription};
pub use engine::{PollEngine, PollEngineBuilder, SingleExchange};
