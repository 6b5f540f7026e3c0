//! Event bus and the engine's event vocabulary.
//!
//! The bus keeps events of a kind nobody has subscribed to yet, and hands
//! them to the first subscriber of that kind.

mod bus;
pub mod events;

pub use bus::{BusEvent, EventBus, Subscription};
pub use events::{EngineEvent, EventKind};
