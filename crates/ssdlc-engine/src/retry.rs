//! Retry coordinator for stage invocations
//!
//! Wraps one fallible stage call with bounded retries, classified backoff and
//! a single human decision once retries are exhausted:
//!
//! - `RateLimited` waits exactly the server-suggested delay.
//! - `ServiceUnavailable` / `InternalTransient` back off exponentially from
//!   the base delay with per-call jitter, capped at the policy ceiling.
//! - `Unclassified` is never retried and goes straight to escalation.
//!
//! The backoff sleep and the escalation prompt are the suspension points;
//! both honor a [`CancellationToken`].

use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ssdlc_config::RetrySettings;
use ssdlc_stage_api::{StageFailure, StageId};
use ssdlc_utils::error::WorkflowError;
use ssdlc_utils::redaction::redact_error_message;
use ssdlc_utils::types::ErrorClass;

/// Limits and delays for one retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
    /// Extra wait granted once per sequence when the operator asks to wait longer
    pub extra_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_secs(settings.base_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
            max_jitter: Duration::from_secs(settings.max_jitter_secs),
            extra_wait: Duration::from_secs(settings.extra_wait_secs),
        }
    }
}

impl RetryPolicy {
    /// Upper bound (exclusive) of the jitter added to exponential delays.
    ///
    /// Never more than the base delay, so successive delays stay
    /// non-decreasing.
    #[must_use]
    pub fn jitter_bound(&self) -> Duration {
        self.max_jitter.min(self.base_delay)
    }

    /// Exponential delay after the failure of zero-based `retry_index`.
    ///
    /// `jitter` is clamped to [`jitter_bound`](Self::jitter_bound).
    #[must_use]
    pub fn backoff_delay(&self, retry_index: u32, jitter: Duration) -> Duration {
        let factor = 1u32.checked_shl(retry_index).unwrap_or(u32::MAX);
        let jitter = jitter.min(self.jitter_bound().saturating_sub(Duration::from_millis(1)));
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter)
            .min(self.max_delay)
    }

    /// Delay before the next attempt, or `None` if `class` is not retried.
    ///
    /// Jitter is drawn per call.
    #[must_use]
    pub fn delay_for(&self, class: ErrorClass, retry_index: u32) -> Option<Duration> {
        match class {
            ErrorClass::RateLimited { retry_after } => Some(retry_after),
            ErrorClass::ServiceUnavailable | ErrorClass::InternalTransient => {
                Some(self.backoff_delay(retry_index, random_jitter(self.jitter_bound())))
            }
            ErrorClass::Unclassified => None,
        }
    }
}

fn random_jitter(bound: Duration) -> Duration {
    let bound_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..bound_ms))
}

/// Suspends a retry sequence between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `delay`. Returns `false` if `cancel` fired first.
    async fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> bool;
}

/// Real wall-clock sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

/// Operator choice once automatic retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationDecision {
    /// Mark the stage degraded and move on.
    Continue,
    /// Wait the extra delay and try once more (rate limits only).
    WaitMore,
    /// Stop the run and surface the failure.
    Abort,
}

/// What the operator is asked about.
#[derive(Debug, Clone, Copy)]
pub struct EscalationRequest<'a> {
    pub stage: StageId,
    pub class: ErrorClass,
    pub attempts: u32,
    pub message: &'a str,
    /// Whether `WaitMore` is honored for this request
    pub allow_wait_more: bool,
    pub extra_wait: Duration,
}

/// Decision point for exhausted retries.
#[async_trait]
pub trait Escalator: Send + Sync {
    /// Answer `request`. An escalator still waiting when `cancel` fires
    /// returns [`EscalationDecision::Abort`].
    async fn escalate(
        &self,
        request: &EscalationRequest<'_>,
        cancel: &CancellationToken,
    ) -> EscalationDecision;
}

/// Escalator that always answers the same way.
#[derive(Debug, Clone, Copy)]
pub struct PolicyEscalator {
    decision: EscalationDecision,
}

impl PolicyEscalator {
    #[must_use]
    pub const fn new(decision: EscalationDecision) -> Self {
        Self { decision }
    }
}

#[async_trait]
impl Escalator for PolicyEscalator {
    async fn escalate(
        &self,
        request: &EscalationRequest<'_>,
        _cancel: &CancellationToken,
    ) -> EscalationDecision {
        info!(
            stage = %request.stage,
            error_class = request.class.label(),
            attempts = request.attempts,
            decision = ?self.decision,
            "Escalation answered by policy"
        );
        self.decision
    }
}

/// Result of a retry sequence that was not aborted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub succeeded: bool,
    pub value: Option<T>,
    pub attempts_used: u32,
    pub last_error_class: Option<ErrorClass>,
}

impl<T> RetryOutcome<T> {
    fn success(value: T, attempts_used: u32, last_error_class: Option<ErrorClass>) -> Self {
        Self {
            succeeded: true,
            value: Some(value),
            attempts_used,
            last_error_class,
        }
    }

    fn degraded(attempts_used: u32, class: ErrorClass) -> Self {
        Self {
            succeeded: false,
            value: None,
            attempts_used,
            last_error_class: Some(class),
        }
    }
}

/// Runs one stage operation under a [`RetryPolicy`].
pub struct RetryCoordinator<'a> {
    policy: &'a RetryPolicy,
    sleeper: &'a dyn Sleeper,
    escalator: &'a dyn Escalator,
}

impl<'a> RetryCoordinator<'a> {
    #[must_use]
    pub fn new(
        policy: &'a RetryPolicy,
        sleeper: &'a dyn Sleeper,
        escalator: &'a dyn Escalator,
    ) -> Self {
        Self {
            policy,
            sleeper,
            escalator,
        }
    }

    /// Run `operation` until it succeeds, the operator decides, or `cancel` fires.
    ///
    /// `operation` receives the 1-based attempt number. `Ok` with
    /// `succeeded == false` means the operator chose to continue without a
    /// value; an abort or cancellation is returned as a [`WorkflowError`].
    pub async fn execute<T, F, Fut>(
        &self,
        stage: StageId,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<RetryOutcome<T>, WorkflowError>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T, StageFailure>> + Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut last_class = None;

        // Automatic phase: at most `max_attempts` calls.
        let failure = loop {
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled { stage, attempts });
            }
            attempts += 1;
            match operation(attempts).await {
                Ok(value) => return Ok(RetryOutcome::success(value, attempts, last_class)),
                Err(failure) => {
                    let class = failure.class();
                    last_class = Some(class);
                    warn!(
                        stage = %stage,
                        attempt = attempts,
                        error_class = class.label(),
                        error = %redact_error_message(failure.message()),
                        "Stage attempt failed"
                    );

                    if attempts >= max_attempts {
                        break failure;
                    }
                    let Some(delay) = self.policy.delay_for(class, attempts - 1) else {
                        break failure;
                    };
                    debug!(
                        stage = %stage,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Backing off before retry"
                    );
                    if !self.sleeper.sleep(delay, cancel).await {
                        return Err(WorkflowError::Cancelled { stage, attempts });
                    }
                }
            }
        };

        // Escalation phase.
        let mut failure = failure;
        let mut extra_wait_used = false;
        loop {
            let class = failure.class();
            let allow_wait_more = class.is_rate_limited() && !extra_wait_used;
            let request = EscalationRequest {
                stage,
                class,
                attempts,
                message: failure.message(),
                allow_wait_more,
                extra_wait: self.policy.extra_wait,
            };

            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled { stage, attempts });
            }
            let decision = self.escalator.escalate(&request, cancel).await;
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled { stage, attempts });
            }

            match decision {
                EscalationDecision::Continue => {
                    return Ok(RetryOutcome::degraded(attempts, class));
                }
                EscalationDecision::WaitMore if allow_wait_more => {
                    extra_wait_used = true;
                    info!(
                        stage = %stage,
                        delay_ms = u64::try_from(self.policy.extra_wait.as_millis()).unwrap_or(u64::MAX),
                        "Waiting longer before one more attempt"
                    );
                    if !self.sleeper.sleep(self.policy.extra_wait, cancel).await {
                        return Err(WorkflowError::Cancelled { stage, attempts });
                    }
                    attempts += 1;
                    match operation(attempts).await {
                        Ok(value) => {
                            return Ok(RetryOutcome::success(value, attempts, Some(class)));
                        }
                        Err(next) => failure = next,
                    }
                }
                EscalationDecision::WaitMore | EscalationDecision::Abort => {
                    return Err(WorkflowError::StageAborted {
                        stage,
                        class: Some(class),
                        reason: redact_error_message(failure.message()),
                        attempts,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingSleeper, ScriptedEscalator};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(120),
            max_jitter: Duration::from_secs(5),
            extra_wait: Duration::from_secs(120),
        }
    }

    fn unavailable() -> StageFailure {
        StageFailure::Transient {
            class: ErrorClass::ServiceUnavailable,
            message: "503 UNAVAILABLE".into(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff_delay(0, Duration::ZERO), Duration::from_secs(10));
        assert_eq!(p.backoff_delay(1, Duration::ZERO), Duration::from_secs(20));
        assert_eq!(p.backoff_delay(2, Duration::ZERO), Duration::from_secs(40));
        assert_eq!(p.backoff_delay(5, Duration::ZERO), Duration::from_secs(120));
        assert_eq!(p.backoff_delay(40, Duration::from_secs(4)), Duration::from_secs(120));
    }

    #[test]
    fn test_jitter_is_bounded_by_base() {
        let p = RetryPolicy {
            base_delay: Duration::from_secs(2),
            ..policy()
        };
        assert_eq!(p.jitter_bound(), Duration::from_secs(2));
        assert!(p.backoff_delay(0, Duration::from_secs(60)) < Duration::from_secs(4));
    }

    #[test]
    fn test_rate_limit_uses_server_delay() {
        let class = ErrorClass::RateLimited {
            retry_after: Duration::from_secs(37),
        };
        assert_eq!(policy().delay_for(class, 2), Some(Duration::from_secs(37)));
        assert_eq!(policy().delay_for(ErrorClass::Unclassified, 0), None);
    }

    #[tokio::test]
    async fn test_success_after_transient_failure() {
        let p = policy();
        let sleeper = RecordingSleeper::new();
        let escalator = ScriptedEscalator::new([]);
        let calls = AtomicU32::new(0);

        let outcome = RetryCoordinator::new(&p, &sleeper, &escalator)
            .execute(StageId::Design, &CancellationToken::new(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n == 0 { Err(unavailable()) } else { Ok("doc") } }
            })
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.value, Some("doc"));
        assert_eq!(outcome.attempts_used, 2);
        assert_eq!(outcome.last_error_class, Some(ErrorClass::ServiceUnavailable));
        assert_eq!(sleeper.delays().len(), 1);
        assert!(escalator.requests().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_escalates_after_max_attempts() {
        let p = policy();
        let sleeper = RecordingSleeper::new();
        let escalator = ScriptedEscalator::new([EscalationDecision::Continue]);
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = RetryCoordinator::new(&p, &sleeper, &escalator)
            .execute(StageId::Security, &CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(unavailable()) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!outcome.succeeded);
        assert!(outcome.value.is_none());
        assert_eq!(outcome.attempts_used, 3);

        let delays = sleeper.delays();
        assert_eq!(delays.len(), 2);
        assert!(delays[0] >= Duration::from_secs(10) && delays[0] < Duration::from_secs(15));
        assert!(delays[1] >= Duration::from_secs(20) && delays[1] < Duration::from_secs(25));

        let requests = escalator.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].allow_wait_more);
    }

    #[tokio::test]
    async fn test_unclassified_skips_retries() {
        let p = policy();
        let sleeper = RecordingSleeper::new();
        let escalator = ScriptedEscalator::new([EscalationDecision::Abort]);
        let calls = AtomicU32::new(0);

        let err = RetryCoordinator::new(&p, &sleeper, &escalator)
            .execute::<(), _, _>(StageId::Interview, &CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StageFailure::fatal("schema mismatch")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
        assert!(matches!(
            err,
            WorkflowError::StageAborted {
                stage: StageId::Interview,
                class: Some(ErrorClass::Unclassified),
                attempts: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_wait_more_grants_one_extra_attempt() {
        let p = RetryPolicy {
            max_attempts: 2,
            ..policy()
        };
        let sleeper = RecordingSleeper::new();
        let escalator = ScriptedEscalator::new([EscalationDecision::WaitMore]);
        let calls = AtomicU32::new(0);
        let limited = ErrorClass::RateLimited {
            retry_after: Duration::from_secs(7),
        };

        let outcome = RetryCoordinator::new(&p, &sleeper, &escalator)
            .execute(StageId::Environment, &CancellationToken::new(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(StageFailure::Transient {
                            class: limited,
                            message: "429".into(),
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(7), Duration::from_secs(120)]
        );
        assert!(escalator.requests()[0].allow_wait_more);
    }

    #[tokio::test]
    async fn test_wait_more_only_once() {
        let p = RetryPolicy {
            max_attempts: 1,
            ..policy()
        };
        let sleeper = RecordingSleeper::new();
        let escalator =
            ScriptedEscalator::new([EscalationDecision::WaitMore, EscalationDecision::WaitMore]);
        let limited = StageFailure::Transient {
            class: ErrorClass::RateLimited {
                retry_after: Duration::from_secs(1),
            },
            message: "RESOURCE_EXHAUSTED".into(),
        };

        let err = RetryCoordinator::new(&p, &sleeper, &escalator)
            .execute::<(), _, _>(StageId::Design, &CancellationToken::new(), |_| {
                let limited = limited.clone();
                async move { Err(limited) }
            })
            .await
            .unwrap_err();

        let requests = escalator.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].allow_wait_more);
        assert!(!requests[1].allow_wait_more);
        assert!(matches!(err, WorkflowError::StageAborted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_wait_more_on_non_rate_limit_aborts() {
        let p = RetryPolicy {
            max_attempts: 1,
            ..policy()
        };
        let sleeper = RecordingSleeper::new();
        let escalator = ScriptedEscalator::new([EscalationDecision::WaitMore]);

        let err = RetryCoordinator::new(&p, &sleeper, &escalator)
            .execute::<(), _, _>(StageId::Design, &CancellationToken::new(), |_| async {
                Err(unavailable())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::StageAborted { .. }));
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let p = policy();
        let escalator = ScriptedEscalator::new([]);
        let cancel = CancellationToken::new();

        let err = RetryCoordinator::new(&p, &TokioSleeper, &escalator)
            .execute::<(), _, _>(StageId::Security, &cancel, |_| {
                cancel.cancel();
                async { Err(unavailable()) }
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            WorkflowError::Cancelled {
                stage: StageId::Security,
                attempts: 1
            }
        );
        assert!(escalator.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let p = policy();
        let escalator = ScriptedEscalator::new([]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = RetryCoordinator::new(&p, &RecordingSleeper::new(), &escalator)
            .execute::<(), _, _>(StageId::Design, &cancel, |_| async { Ok(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Cancelled { attempts: 0, .. }));
    }

    #[tokio::test]
    async fn test_cancel_before_escalation_skips_the_prompt() {
        let p = policy();
        let escalator = ScriptedEscalator::new([EscalationDecision::Continue]);
        let cancel = CancellationToken::new();

        let err = RetryCoordinator::new(&p, &RecordingSleeper::new(), &escalator)
            .execute::<(), _, _>(StageId::Design, &cancel, |_| {
                cancel.cancel();
                async { Err(StageFailure::fatal("bad output")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Cancelled { attempts: 1, .. }));
        assert!(escalator.requests().is_empty());
    }
}
