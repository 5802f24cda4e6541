//! Classification-aware retry around a single recognition call.
//!
//! Rate-limited vision backends fail often and transiently. The invoker
//! retries only what a [`FailureClassifier`] calls [`FailureClass::Transient`],
//! waits `base * (i + 1) + jitter` after failed attempt `i` (0-based), races
//! every call and every sleep against the run's [`CancelToken`], and hands
//! the last error back unchanged once the budget is spent.
//!
//! The classifier is a swappable strategy so the policy can be tested
//! without depending on any backend's error wording. Closures work too:
//!
//! ```rust
//! use edgequake_rollscan::pipeline::retry::{FailureClass, RetryPolicy, RetryingInvoker};
//! use edgequake_rollscan::RecognitionError;
//!
//! let never_retry = |_: &RecognitionError| FailureClass::Permanent;
//! let invoker = RetryingInvoker::with_classifier(RetryPolicy::default(), never_retry);
//! # let _ = invoker;
//! ```

use crate::cancel::CancelToken;
use crate::config::RollConfig;
use crate::error::RecognitionError;
use crate::record::RawRecord;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// What a failed recognition call means for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Caller aborted. Never retried, never reported as a page error.
    Cancelled,
    /// Worth another attempt after backoff.
    Transient,
    /// Retrying will not help.
    Permanent,
}

/// Maps a recognition failure to a [`FailureClass`].
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, error: &RecognitionError) -> FailureClass;
}

impl<F> FailureClassifier for F
where
    F: Fn(&RecognitionError) -> FailureClass + Send + Sync,
{
    fn classify(&self, error: &RecognitionError) -> FailureClass {
        self(error)
    }
}

/// Lower-case fragments that mark a backend message as transient.
pub const TRANSIENT_PATTERNS: &[&str] = &[
    "429",
    "rate limit",
    "rate-limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota",
    "resource exhausted",
    "resource_exhausted",
    "network",
    "timeout",
    "timed out",
    "fetch failed",
];

/// Default classifier: pattern-matches the error's display text.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageClassifier;

impl FailureClassifier for MessageClassifier {
    fn classify(&self, error: &RecognitionError) -> FailureClass {
        match error {
            RecognitionError::Cancelled => FailureClass::Cancelled,
            RecognitionError::Timeout { .. } => FailureClass::Transient,
            RecognitionError::MalformedResponse(_) => FailureClass::Permanent,
            RecognitionError::Backend(msg) => {
                let lower = msg.to_lowercase();
                if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
                    FailureClass::Transient
                } else {
                    FailureClass::Permanent
                }
            }
        }
    }
}

/// Attempt budget, backoff and per-call deadline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first. At least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound (inclusive) of the uniform jitter added to each backoff.
    pub max_jitter: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RollConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RollConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_jitter: Duration::from_millis(config.retry_jitter_ms),
            call_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Wait after failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1) + jitter(self.max_jitter)
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Runs a recognition call under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryingInvoker<C = MessageClassifier> {
    policy: RetryPolicy,
    classifier: C,
}

impl RetryingInvoker<MessageClassifier> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_classifier(policy, MessageClassifier)
    }
}

impl<C: FailureClassifier> RetryingInvoker<C> {
    pub fn with_classifier(policy: RetryPolicy, classifier: C) -> Self {
        Self { policy, classifier }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `call` until it succeeds, fails permanently, is cancelled, or
    /// the attempt budget runs out. The error returned is the last one seen.
    pub async fn invoke<F, Fut>(
        &self,
        mut call: F,
        cancel: &CancelToken,
    ) -> Result<Vec<RawRecord>, RecognitionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<RawRecord>, RecognitionError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let timeout_secs = self.policy.call_timeout.as_secs();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RecognitionError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(RecognitionError::Cancelled),
                r = tokio::time::timeout(self.policy.call_timeout, call()) => {
                    r.unwrap_or(Err(RecognitionError::Timeout { secs: timeout_secs }))
                }
            };

            let err = match outcome {
                Ok(records) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "Recognition succeeded after retry");
                    }
                    return Ok(records);
                }
                Err(e) => e,
            };
            attempt += 1;

            match self.classifier.classify(&err) {
                FailureClass::Cancelled => return Err(err),
                FailureClass::Permanent => {
                    warn!(attempt, error = %err, "Recognition failed, not retrying");
                    return Err(err);
                }
                FailureClass::Transient if attempt >= max_attempts => {
                    warn!(attempts = attempt, error = %err, "Recognition retries exhausted");
                    return Err(err);
                }
                FailureClass::Transient => {
                    let delay = self.policy.backoff(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient recognition failure, backing off"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RecognitionError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
