use std::future::Future;
use std::time::Duration;

use chanpoll_core::fault::Fault;

use super::RetryPolicy;

/// Failure of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub fault: Fault,
    /// Give up without consulting the policy.
    pub stop: bool,
}

impl AttemptError {
    /// Stop exactly when the fault is not recoverable.
    pub fn classified(fault: Fault) -> Self {
        let stop = !fault.is_recoverable();
        Self { fault, stop }
    }
}

impl From<Fault> for AttemptError {
    fn from(fault: Fault) -> Self {
        Self::classified(fault)
    }
}

/// Progress callbacks fired by [`retry`].
pub trait RetryHooks: Send + Sync {
    fn attempt_failed(&self, _attempt: u32, _fault: &Fault) {}
    fn delay_scheduled(&self, _attempt: u32, _delay: Duration) {}
    fn attempt_succeeded(&self, _attempt: u32) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl RetryHooks for NoHooks {}

/// Run `op` until it succeeds, a failure asks to stop, or the policy gives up.
///
/// Attempt numbers start at 1. The inter-attempt wait is a plain sleep; callers
/// that need to cancel it race the returned future.
pub async fn retry<T, F, Fut>(
    policy: &dyn RetryPolicy,
    hooks: &dyn RetryHooks,
    mut op: F,
) -> Result<T, Fault>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut attempt = 1u32;
    loop {
        match op(attempt).await {
            Ok(v) => {
                hooks.attempt_succeeded(attempt);
                return Ok(v);
            }
            Err(e) => {
                hooks.attempt_failed(attempt, &e.fault);
                if e.stop {
                    return Err(e.fault);
                }
                let Some(delay) = policy.delay_for(attempt) else {
                    return Err(e.fault);
                };
                hooks.delay_scheduled(attempt, delay);
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::retry::{ExponentialBackoff, NoRetry};

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl RetryHooks for Recorder {
        fn attempt_failed(&self, attempt: u32, fault: &Fault) {
            self.log.lock().unwrap().push(format!("failed:{attempt}:{}", fault.code()));
        }
        fn delay_scheduled(&self, attempt: u32, delay: Duration) {
            self.log.lock().unwrap().push(format!("delay:{attempt}:{}", delay.as_millis()));
        }
        fn attempt_succeeded(&self, attempt: u32) {
            self.log.lock().unwrap().push(format!("ok:{attempt}"));
        }
    }

    fn policy() -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
            0.0,
            5,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn recoverable_faults_are_retried() {
        let hooks = Recorder::default();
        let calls = AtomicU32::new(0);
        let out = retry(&policy(), &hooks, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(AttemptError::classified(Fault::Timeout))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(out, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *hooks.log.lock().unwrap(),
            vec![
                "failed:1:TIMEOUT",
                "delay:1:10",
                "failed:2:TIMEOUT",
                "delay:2:20",
                "ok:3"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_recoverable_fault_stops_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let out: Result<(), Fault> = retry(&policy(), &NoHooks, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::classified(Fault::from_status(500))) }
        })
        .await;

        assert_eq!(out, Err(Fault::from_status(500)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_policy_makes_one_attempt() {
        let calls = AtomicU32::new(0);
        let out: Result<(), Fault> = retry(&NoRetry, &NoHooks, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::classified(Fault::Connection("refused".into()))) }
        })
        .await;

        assert!(matches!(out, Err(Fault::Connection(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn policy_limit_ends_loop() {
        let calls = AtomicU32::new(0);
        let out: Result<(), Fault> = retry(&policy(), &NoHooks, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::classified(Fault::Timeout)) }
        })
        .await;

        assert_eq!(out, Err(Fault::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
