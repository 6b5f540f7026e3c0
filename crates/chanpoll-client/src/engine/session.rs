//! Per-run session state. Replaced wholesale on hard-terminate.

use std::collections::HashMap;

use futures_util::future::AbortHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Channel negotiation progress.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum ChannelSlot {
    #[default]
    Unset,
    Pending,
    Resolved(String),
}

/// One-shot interrupt, resolved at most once.
#[derive(Debug)]
pub(crate) struct Interrupt {
    tx: watch::Sender<bool>,
}

impl Interrupt {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub(crate) fn listen(&self) -> InterruptListener {
        InterruptListener {
            rx: self.tx.subscribe(),
        }
    }

    pub(crate) fn resolve(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct InterruptListener {
    rx: watch::Receiver<bool>,
}

impl InterruptListener {
    /// Completes once the interrupt is resolved or its session is gone.
    pub(crate) async fn fired(&mut self) {
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

#[derive(Debug, Default)]
pub(crate) struct Session {
    /// 0 for an idle session; each `run()` assigns a fresh value.
    pub(crate) generation: u64,
    pub(crate) channel: ChannelSlot,
    pub(crate) interrupt: Option<Interrupt>,
    pub(crate) in_flight: HashMap<u64, AbortHandle>,
    /// Presence means "running".
    pub(crate) timer: Option<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn is_running(&self, generation: u64) -> bool {
        self.generation == generation && self.timer.is_some()
    }

    /// Tear down what this session owns: fire the interrupt, abort requests.
    /// The timer task is detached; it observes the interrupt and exits.
    pub(crate) fn shutdown(self) {
        if let Some(interrupt) = &self.interrupt {
            interrupt.resolve();
        }
        for (_, handle) in self.in_flight {
            handle.abort();
        }
        drop(self.timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listener_fires_on_resolve() {
        let interrupt = Interrupt::new();
        let mut listener = interrupt.listen();
        interrupt.resolve();
        listener.fired().await;
    }

    #[tokio::test]
    async fn listener_fires_when_interrupt_dropped() {
        let interrupt = Interrupt::new();
        let mut listener = interrupt.listen();
        drop(interrupt);
        listener.fired().await;
    }

    #[test]
    fn shutdown_aborts_in_flight() {
        let (handle, _reg) = AbortHandle::new_pair();
        let mut session = Session::default();
        session.in_flight.insert(1, handle.clone());
        session.shutdown();
        assert!(handle.is_aborted());
    }
}
