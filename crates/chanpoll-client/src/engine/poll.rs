use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::AbortHandle;

use chanpoll_core::error::Result;
use chanpoll_core::fault::{Classify, Fault};
use chanpoll_core::protocol::{Envelope, ProtocolError};

use crate::bus::{EngineEvent, EventBus, EventKind, Subscription};
use crate::config::{ClientConfig, EngineSection};
use crate::obs::EngineMetrics;
use crate::retry::{retry, AttemptError, ExponentialBackoff, NoRetry, RetryHooks, RetryPolicy};
use crate::transport::{send_abortable, SendOptions, Transport};

use super::decision::{decide_fault, decide_response, DecideContext, Decision, Mode, Outcome, Termination};
use super::hook::{CycleContext, MessageHook, NoHook};
use super::session::{ChannelSlot, Interrupt, InterruptListener, Session};

/// Result of the interrupt/retry race.
#[derive(Debug)]
enum Exchange {
    Response(Envelope),
    Interrupted,
}

/// Long-polling engine bound to one route.
///
/// Cloning is cheap and every clone drives the same session. `run`,
/// `stop` and `terminate` never fail; everything observable flows through
/// [`PollEngine::subscribe`].
#[derive(Clone)]
pub struct PollEngine {
    inner: Arc<EngineInner>,
}

pub struct PollEngineBuilder {
    transport: Arc<dyn Transport>,
    options: EngineSection,
    mode: Mode,
    retry: Option<Arc<dyn RetryPolicy>>,
    hook: Arc<dyn MessageHook>,
    metrics: Option<Arc<EngineMetrics>>,
}

impl PollEngineBuilder {
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn hook(mut self, hook: impl MessageHook + 'static) -> Self {
        self.hook = Arc::new(hook);
        self
    }

    /// Share a metrics registry between engines.
    pub fn metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<PollEngine> {
        self.options.validate()?;
        let retry = self
            .retry
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::default()));

        Ok(PollEngine {
            inner: Arc::new(EngineInner {
                route: self.options.route.clone(),
                bus: EventBus::new(self.options.event_backlog),
                options: self.options,
                mode: self.mode,
                transport: self.transport,
                retry,
                hook: self.hook,
                metrics: self.metrics.unwrap_or_default(),
                session: Mutex::new(Session::default()),
                generations: AtomicU64::new(0),
                next_request: AtomicU64::new(1),
            }),
        })
    }
}

impl PollEngine {
    pub fn builder(transport: Arc<dyn Transport>, options: EngineSection) -> PollEngineBuilder {
        PollEngineBuilder {
            transport,
            options,
            mode: Mode::Streaming,
            retry: None,
            hook: Arc::new(NoHook),
            metrics: None,
        }
    }

    /// Engine settings and retry policy taken from a loaded config file.
    pub fn from_config(cfg: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::builder(transport, cfg.engine.clone())
            .retry_policy(Arc::new(ExponentialBackoff::from_config(&cfg.retry)))
            .build()
    }

    /// Start polling. No-op while running. Must be called inside a tokio runtime.
    pub fn run(&self) {
        let inner = &self.inner;
        let mut session = inner.session();
        if session.timer.is_some() {
            return;
        }

        let generation = inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let interrupt = Interrupt::new();
        let listener = interrupt.listen();
        *session = Session {
            generation,
            interrupt: Some(interrupt),
            ..Session::default()
        };
        let driver = Arc::clone(inner);
        session.timer = Some(tokio::spawn(driver.drive(generation, listener)));
        drop(session);

        inner.metrics.engines_running.inc(&[("route", inner.route.as_str())]);
        tracing::info!(route = %inner.route, generation, "poll engine started");
    }

    /// Send one best-effort terminate-notice, then hard-terminate.
    ///
    /// Bounded by the request timeout. Only the first of several concurrent
    /// calls sends a notice; the rest return immediately.
    pub async fn stop(&self) {
        let generation = self.inner.session().generation;
        self.inner.stop_generation(generation).await;
    }

    /// Hard-terminate: fire the interrupt, abort in-flight requests and
    /// forget the channel. Idempotent.
    pub fn terminate(&self) {
        let generation = self.inner.session().generation;
        self.inner.terminate_generation(generation);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.session().timer.is_none()
    }

    /// Negotiated channel id of the current run.
    pub fn channel_id(&self) -> Option<String> {
        match &self.inner.session().channel {
            ChannelSlot::Resolved(id) => Some(id.clone()),
            ChannelSlot::Unset | ChannelSlot::Pending => None,
        }
    }

    pub fn route(&self) -> &str {
        &self.inner.route
    }

    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription<EngineEvent> {
        self.inner.bus.subscribe(kinds)
    }

    pub fn subscribe_all(&self) -> Subscription<EngineEvent> {
        self.inner.bus.subscribe(&EventKind::ALL)
    }

    pub fn unsubscribe_all(&self) {
        self.inner.bus.unsubscribe_all();
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.inner.metrics
    }
}

struct EngineInner {
    route: String,
    options: EngineSection,
    mode: Mode,
    transport: Arc<dyn Transport>,
    retry: Arc<dyn RetryPolicy>,
    hook: Arc<dyn MessageHook>,
    bus: EventBus<EngineEvent>,
    metrics: Arc<EngineMetrics>,
    session: Mutex<Session>,
    generations: AtomicU64,
    next_request: AtomicU64,
}

impl EngineInner {
    // Never held across an await point.
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self, generation: u64) -> bool {
        self.session().is_running(generation)
    }

    fn publish(&self, event: EngineEvent) {
        self.bus.publish(event);
    }

    async fn drive(self: Arc<Self>, generation: u64, mut interrupt: InterruptListener) {
        let mut delay = Duration::ZERO;
        let mut cycle = 0u64;
        let mut errors = Vec::new();

        let termination = loop {
            tokio::select! {
                biased;
                _ = interrupt.fired() => break Termination::by_caller(std::mem::take(&mut errors)),
                _ = tokio::time::sleep(delay) => {}
            }
            if !self.is_running(generation) {
                break Termination::by_caller(std::mem::take(&mut errors));
            }

            cycle += 1;
            let Outcome { events, decision } =
                self.cycle(generation, cycle, &mut interrupt, &mut errors).await;
            for event in events {
                self.publish(event);
            }

            self.metrics
                .cycles
                .inc(&[("route", self.route.as_str()), ("decision", decision_label(&decision))]);
            match decision {
                Decision::Continue(next) => {
                    tracing::debug!(route = %self.route, delay_ms = next.as_millis() as u64, "next poll scheduled");
                    delay = next;
                }
                Decision::Finalized(termination) => {
                    self.terminate_generation(generation);
                    break termination;
                }
                Decision::Terminate(termination) => {
                    self.stop_generation(generation).await;
                    break termination;
                }
            }
        };

        tracing::info!(
            route = %self.route,
            generation,
            by_caller = termination.by_caller,
            errors = termination.errors.len(),
            "poll engine terminated"
        );
        self.publish(EngineEvent::Terminated {
            errors: termination.errors,
            by_caller: termination.by_caller,
        });
    }

    async fn cycle(
        &self,
        generation: u64,
        cycle: u64,
        interrupt: &mut InterruptListener,
        errors: &mut Vec<ProtocolError>,
    ) -> Outcome {
        let (is_first, channel_id) = {
            let mut session = self.session();
            if !session.is_running(generation) {
                return interrupted(errors);
            }
            match &session.channel {
                ChannelSlot::Resolved(id) => (false, id.clone()),
                ChannelSlot::Pending => (false, String::new()),
                ChannelSlot::Unset => {
                    session.channel = ChannelSlot::Pending;
                    (true, String::new())
                }
            }
        };

        let mut envelope = Envelope::new(self.route.as_str());
        envelope
            .set_trace_id(uuid::Uuid::new_v4().to_string())
            .set_channel_id(channel_id)
            .set_not_ready(!is_first);
        self.hook.prepare(&mut envelope, CycleContext { is_first, cycle });

        tracing::debug!(
            route = %self.route,
            channel_id = envelope.channel_id(),
            trace_id = envelope.trace_id(),
            is_first,
            "poll cycle"
        );

        let cx = DecideContext {
            mode: self.mode,
            locally_terminated: false,
            min_poll_delay: Duration::from_millis(self.options.min_poll_delay_ms),
            recovery_delay: self.options.recovery_delay(),
        };

        let frame = match envelope.encode(self.options.format) {
            Ok(frame) => frame,
            Err(e) => {
                self.release_channel(generation, is_first);
                return self.fault_outcome(e.classify(), cx, errors);
            }
        };

        let policy: &dyn RetryPolicy = if self.options.reconnects {
            self.retry.as_ref()
        } else {
            &NoRetry
        };
        let hooks = ReconnectHooks::new(self);

        let exchange = tokio::select! {
            biased;
            _ = interrupt.fired() => Ok(Exchange::Interrupted),
            res = retry(policy, &hooks, |attempt| self.attempt(generation, attempt, frame.clone())) => res,
        };

        match exchange {
            Ok(Exchange::Interrupted) => {
                self.release_channel(generation, is_first);
                interrupted(errors)
            }
            Err(fault) => {
                self.release_channel(generation, is_first);
                self.fault_outcome(fault, cx, errors)
            }
            Ok(Exchange::Response(response)) => {
                let mut events = Vec::new();
                if let Some(attempt) = hooks.reconnected_on() {
                    events.push(EngineEvent::ReconnectSucceeded { attempt });
                }
                if is_first {
                    self.resolve_channel(generation, &response, &mut events);
                }
                let cx = DecideContext {
                    locally_terminated: !self.is_running(generation),
                    ..cx
                };
                let mut outcome = decide_response(&response, cx, errors);
                self.metrics.messages.add(
                    &[("route", self.route.as_str())],
                    outcome
                        .events
                        .iter()
                        .filter(|e| matches!(e, EngineEvent::MessageReceived { .. }))
                        .count() as u64,
                );
                events.append(&mut outcome.events);
                Outcome {
                    events,
                    decision: outcome.decision,
                }
            }
        }
    }

    async fn attempt(
        &self,
        generation: u64,
        attempt: u32,
        frame: Bytes,
    ) -> std::result::Result<Exchange, AttemptError> {
        let (handle, registration) = AbortHandle::new_pair();
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        {
            let mut session = self.session();
            if !session.is_running(generation) {
                return Ok(Exchange::Interrupted);
            }
            session.in_flight.insert(request_id, handle);
        }
        if attempt > 1 {
            tracing::info!(route = %self.route, attempt, "reconnect attempt");
            self.publish(EngineEvent::ReconnectStarted { attempt });
        }

        let opts = SendOptions {
            timeout: self.options.request_timeout(),
            keep_alive: false,
        };
        let labels = [("route", self.route.as_str())];
        self.metrics.bytes_sent.add(&labels, frame.len() as u64);

        let started = tokio::time::Instant::now();
        let result =
            send_abortable(self.transport.as_ref(), &self.route, frame, opts, registration).await;
        self.metrics.exchange_duration.observe(&labels, started.elapsed());
        {
            let mut session = self.session();
            if session.generation == generation {
                session.in_flight.remove(&request_id);
            }
        }

        match result {
            Ok(response) if response.is_success() => {
                self.metrics
                    .bytes_received
                    .add(&labels, response.body.len() as u64);
                Envelope::decode(response.body, self.options.format)
                    .map(Exchange::Response)
                    .map_err(|e| AttemptError::classified(e.classify()))
            }
            Ok(response) => Err(AttemptError::classified(Fault::from_status(response.status))),
            Err(e) if e.is_abort() => Ok(Exchange::Interrupted),
            Err(e) => Err(AttemptError::classified(e.classify())),
        }
    }

    fn fault_outcome(&self, fault: Fault, cx: DecideContext, errors: &[ProtocolError]) -> Outcome {
        tracing::warn!(route = %self.route, code = fault.code(), error = %fault, "exchange failed");
        self.metrics
            .faults
            .inc(&[("route", self.route.as_str()), ("code", fault.code())]);
        decide_fault(fault, cx, errors)
    }

    /// The creating exchange is the only place a channel id is assigned.
    fn resolve_channel(&self, generation: u64, response: &Envelope, events: &mut Vec<EngineEvent>) {
        let id = response.channel_id().to_owned();
        if id.is_empty() {
            events.push(EngineEvent::InvalidMessage {
                trace_id: response.trace_id().to_owned(),
                reason: "channel-establishing response carried no channel id".into(),
            });
        }
        let mut session = self.session();
        if session.generation == generation && session.channel == ChannelSlot::Pending {
            tracing::info!(route = %self.route, channel_id = %id, "channel negotiated");
            session.channel = ChannelSlot::Resolved(id);
        }
    }

    /// Undo a pending negotiation so the next cycle negotiates again.
    fn release_channel(&self, generation: u64, created: bool) {
        if !created {
            return;
        }
        let mut session = self.session();
        if session.generation == generation && session.channel == ChannelSlot::Pending {
            session.channel = ChannelSlot::Unset;
        }
    }

    async fn stop_generation(&self, generation: u64) {
        let channel_id = {
            let mut session = self.session();
            if !session.is_running(generation) {
                return;
            }
            // Detached; the task exits once the interrupt fires.
            session.timer.take();
            match &session.channel {
                ChannelSlot::Resolved(id) => id.clone(),
                ChannelSlot::Unset | ChannelSlot::Pending => String::new(),
            }
        };

        self.send_terminate_notice(channel_id).await;
        self.terminate_generation(generation);
    }

    async fn send_terminate_notice(&self, channel_id: String) {
        let mut notice = Envelope::new(self.route.as_str());
        notice
            .set_trace_id(uuid::Uuid::new_v4().to_string())
            .set_channel_id(channel_id)
            .set_not_ready(true)
            .set_terminated(true);

        let frame = match notice.encode(self.options.format) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(route = %self.route, error = %e, "terminate notice not encoded");
                return;
            }
        };
        let opts = SendOptions {
            timeout: self.options.request_timeout(),
            keep_alive: true,
        };
        let call = self.transport.send(&self.route, frame, opts);
        match tokio::time::timeout(opts.timeout, call).await {
            Ok(Ok(res)) if res.is_success() => {
                tracing::debug!(route = %self.route, "terminate notice delivered");
            }
            Ok(Ok(res)) => {
                tracing::debug!(route = %self.route, status = res.status, "terminate notice rejected");
            }
            Ok(Err(e)) => tracing::debug!(route = %self.route, error = %e, "terminate notice failed"),
            Err(_) => tracing::debug!(route = %self.route, "terminate notice timed out"),
        }
    }

    fn terminate_generation(&self, generation: u64) {
        let old = {
            let mut session = self.session();
            if generation == 0 || session.generation != generation {
                return;
            }
            std::mem::take(&mut *session)
        };
        old.shutdown();
        self.metrics.engines_running.dec(&[("route", self.route.as_str())]);
        tracing::debug!(route = %self.route, generation, "session discarded");
    }
}

fn interrupted(errors: &[ProtocolError]) -> Outcome {
    Outcome {
        events: Vec::new(),
        decision: Decision::Finalized(Termination::by_caller(errors.to_vec())),
    }
}

fn decision_label(decision: &Decision) -> &'static str {
    match decision {
        Decision::Continue(_) => "continue",
        Decision::Terminate(_) => "terminate",
        Decision::Finalized(_) => "finalized",
    }
}

/// Publishes reconnect progress for the retry driver.
///
/// Success is only recorded here. An attempt that observed a stop also
/// resolves `Ok`, so the cycle announces the reconnect once it holds a
/// decoded response.
struct ReconnectHooks<'a> {
    engine: &'a EngineInner,
    succeeded_on: AtomicU32,
}

impl<'a> ReconnectHooks<'a> {
    fn new(engine: &'a EngineInner) -> Self {
        Self {
            engine,
            succeeded_on: AtomicU32::new(0),
        }
    }

    /// Attempt number of a successful reconnect, if the exchange needed one.
    fn reconnected_on(&self) -> Option<u32> {
        let attempt = self.succeeded_on.load(Ordering::Relaxed);
        (attempt > 1).then_some(attempt)
    }
}

impl RetryHooks for ReconnectHooks<'_> {
    fn attempt_failed(&self, attempt: u32, fault: &Fault) {
        tracing::debug!(route = %self.engine.route, attempt, code = fault.code(), "attempt failed");
        self.engine.publish(EngineEvent::ReconnectFailed {
            attempt,
            fault: fault.clone(),
        });
    }

    fn delay_scheduled(&self, attempt: u32, delay: Duration) {
        tracing::debug!(
            route = %self.engine.route,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "retry scheduled"
        );
        self.engine
            .metrics
            .retries
            .inc(&[("route", self.engine.route.as_str())]);
    }

    fn attempt_succeeded(&self, attempt: u32) {
        self.succeeded_on.store(attempt, Ordering::Relaxed);
    }
}
