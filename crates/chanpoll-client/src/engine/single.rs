use bytes::Bytes;

use chanpoll_core::error::Result;

use crate::bus::{EngineEvent, EventKind};

use super::decision::Mode;
use super::hook::SubscribeBody;
use super::poll::{PollEngine, PollEngineBuilder};

/// Request/response over the polling channel: sends `request` on the
/// channel-establishing exchange and ends the session after the first
/// payload comes back.
#[derive(Clone)]
pub struct SingleExchange {
    engine: PollEngine,
}

impl SingleExchange {
    /// Any hook or mode already set on `builder` is replaced.
    pub fn new(builder: PollEngineBuilder, request: Bytes) -> Result<Self> {
        let engine = builder
            .mode(Mode::SingleExchange)
            .hook(SubscribeBody(request))
            .build()?;
        Ok(Self { engine })
    }

    /// Run the session to completion. Resolves with the first payload, or
    /// `None` when the session ended without one.
    pub async fn exchange(&self) -> Option<Bytes> {
        let mut sub = self
            .engine
            .subscribe(&[EventKind::MessageReceived, EventKind::Terminated]);
        self.engine.run();

        let mut first = None;
        while let Some(event) = sub.recv().await {
            match event {
                EngineEvent::MessageReceived { body, .. } => {
                    if first.is_none() {
                        first = Some(body);
                    }
                }
                EngineEvent::Terminated { .. } => break,
                _ => {}
            }
        }
        first
    }

    /// Underlying engine, for `stop`/`terminate` and extra subscriptions.
    pub fn engine(&self) -> &PollEngine {
        &self.engine
    }
}
