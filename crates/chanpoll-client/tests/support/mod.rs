//! Scripted in-memory transport for engine tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use chanpoll_client::bus::{EngineEvent, Subscription};
use chanpoll_client::config::EngineSection;
use chanpoll_client::transport::{HttpResponse, SendOptions, Transport, TransportError};
use chanpoll_core::protocol::{Envelope, WireFormat};

pub const ROUTE: &str = "events";

/// What the server does with the next non-notice request.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(Envelope),
    Status(u16),
    Raw(&'static [u8]),
    Fail(TransportError),
    /// Never answers; only an abort or the request timeout ends it.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub at: Instant,
    pub envelope: Envelope,
}

/// Answers requests from a script. Terminate notices are recorded separately
/// and answered with an empty 200 without consuming the script. An exhausted
/// script hangs.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Recorded>>,
    notices: Mutex<Vec<Recorded>>,
    notice_delay: Duration,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    /// Like [`ScriptedTransport::new`], but terminate notices take `delay`
    /// to be answered.
    pub fn with_notice_delay(steps: impl IntoIterator<Item = Step>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            notice_delay: delay,
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Recorded> {
        self.notices.lock().unwrap().clone()
    }

    /// Gaps between consecutive request timestamps.
    pub fn request_gaps(&self) -> Vec<Duration> {
        let reqs = self.requests();
        reqs.windows(2).map(|w| w[1].at - w[0].at).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        route: &str,
        body: Bytes,
        _opts: SendOptions,
    ) -> Result<HttpResponse, TransportError> {
        assert_eq!(route, ROUTE);
        let envelope = Envelope::decode(body, WireFormat::Json).unwrap();
        let recorded = Recorded {
            at: Instant::now(),
            envelope,
        };

        if recorded.envelope.is_terminated() {
            self.notices.lock().unwrap().push(recorded);
            tokio::time::sleep(self.notice_delay).await;
            return Ok(HttpResponse::new(200, Bytes::new()));
        }

        let step = {
            self.requests.lock().unwrap().push(recorded);
            self.script.lock().unwrap().pop_front().unwrap_or(Step::Hang)
        };
        match step {
            Step::Respond(env) => Ok(HttpResponse::new(200, env.encode(WireFormat::Json).unwrap())),
            Step::Status(status) => Ok(HttpResponse::new(status, Bytes::new())),
            Step::Raw(raw) => Ok(HttpResponse::new(200, Bytes::from_static(raw))),
            Step::Fail(e) => Err(e),
            Step::Hang => std::future::pending::<Result<HttpResponse, TransportError>>().await,
        }
    }
}

pub fn options() -> EngineSection {
    EngineSection::new("http://chanpoll.test", ROUTE)
}

/// Server response with the given channel id and poll delay.
pub fn reply(channel_id: &str, poll_delay_ms: u32) -> Envelope {
    let mut env = Envelope::new(ROUTE);
    env.set_channel_id(channel_id)
        .set_trace_id("srv")
        .set_poll_delay_ms(poll_delay_ms);
    env
}

pub fn reply_with(channel_id: &str, poll_delay_ms: u32, body: &'static [u8]) -> Envelope {
    let mut env = reply(channel_id, poll_delay_ms);
    env.set_body(Bytes::from_static(body));
    env
}

/// Receive until `pred` matches, failing the test after ten virtual minutes.
pub async fn wait_for<F>(sub: &mut Subscription<EngineEvent>, mut pred: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    let fut = async {
        loop {
            let event = sub.recv().await.expect("bus closed");
            if pred(&event) {
                return event;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(600), fut)
        .await
        .expect("event not published in time")
}

pub async fn next_message(sub: &mut Subscription<EngineEvent>) -> Bytes {
    match wait_for(sub, |e| matches!(e, EngineEvent::MessageReceived { .. })).await {
        EngineEvent::MessageReceived { body, .. } => body,
        _ => unreachable!(),
    }
}

/// Returns `(errors, by_caller)` of the next terminated event.
pub async fn next_terminated(
    sub: &mut Subscription<EngineEvent>,
) -> (Vec<chanpoll_core::protocol::ProtocolError>, bool) {
    match wait_for(sub, |e| matches!(e, EngineEvent::Terminated { .. })).await {
        EngineEvent::Terminated { errors, by_caller } => (errors, by_caller),
        _ => unreachable!(),
    }
}
