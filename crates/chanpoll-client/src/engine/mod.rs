//! Long-polling engine.
//!
//! One spawned task per run drives the cycle loop: build an envelope, race
//! the retry driver against the session interrupt, classify the response,
//! then reschedule or end the session. Session state sits behind a short
//! std mutex and is replaced wholesale on hard-terminate; late completions
//! compare their run generation before touching it.

pub mod decision;
pub mod hook;
mod poll;
mod session;
mod single;

pub use decision::{Decision, Mode, Termination};
pub use hook::{CycleContext, MessageHook, NoHook, SubscribeBody};
pub use poll::{PollEngine, PollEngineBuilder};
pub use single::SingleExchange;
