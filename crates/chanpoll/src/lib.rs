//! Top-level facade crate for chanpoll.
//!
//! Re-exports the protocol core and the polling client so users can depend on a single crate.

pub mod core {
    pub use chanpoll_core::*;
}

pub mod client {
    pub use chanpoll_client::*;
}
