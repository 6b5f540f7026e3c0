//! Caller hook that shapes outgoing envelopes.

use bytes::Bytes;

use chanpoll_core::protocol::Envelope;

/// What the hook knows about the cycle it is preparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleContext {
    /// This cycle negotiates the channel.
    pub is_first: bool,
    /// 1-based cycle counter within the current run.
    pub cycle: u64,
}

/// Adds body/intent to an outgoing envelope. Setting a body makes the
/// exchange a non-pure poll.
pub trait MessageHook: Send + Sync {
    fn prepare(&self, envelope: &mut Envelope, cx: CycleContext);
}

impl<F> MessageHook for F
where
    F: Fn(&mut Envelope, CycleContext) + Send + Sync,
{
    fn prepare(&self, envelope: &mut Envelope, cx: CycleContext) {
        self(envelope, cx)
    }
}

/// Pure polls only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHook;

impl MessageHook for NoHook {
    fn prepare(&self, _envelope: &mut Envelope, _cx: CycleContext) {}
}

/// Sends `body` on the channel-establishing exchange (e.g. a subscribe request).
#[derive(Debug, Clone)]
pub struct SubscribeBody(pub Bytes);

impl MessageHook for SubscribeBody {
    fn prepare(&self, envelope: &mut Envelope, cx: CycleContext) {
        if cx.is_first {
            envelope.set_body(self.0.clone());
        }
    }
}
