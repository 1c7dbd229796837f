//! Classified retry policy with exponential backoff.
//!
//! A [`RetryPolicy`] partitions HTTP status codes into three sets:
//! statuses that end the loop as an acceptable outcome (`continue_on`),
//! statuses that are retried after a backoff (`retry_on`) and statuses that
//! abort the whole operation (`abort_on`). Statuses outside every set fall
//! back to [`RetryConfig::on_unclassified`], which retries by default.
//!
//! Attempts run strictly one after another on the caller's task. The backoff
//! starts at `initial_backoff` and doubles after every retriable failure.
//! Failures that carry no status code are never retried.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{PlatformError, StatusClassified};

/// What the policy does with a failed attempt's status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Acceptable terminal state; stop without a response.
    Continue,
    /// Listed as retriable; back off and try again.
    Retry,
    /// Listed as fatal; fail the whole operation now.
    Abort,
    /// Not listed anywhere; retried as a fallback.
    UnspecifiedRetry,
}

impl Decision {
    /// Stable name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Retry => "retry",
            Self::Abort => "abort",
            Self::UnspecifiedRetry => "unspecified-retry",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw retry parameters.
///
/// Validated into a [`RetryPolicy`] by [`RetryPolicy::new`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Maximum number of invocations, including the first
    pub max_attempts: u32,
    /// Statuses treated as an acceptable outcome
    pub continue_on: BTreeSet<u16>,
    /// Statuses that trigger another attempt after backoff
    pub retry_on: BTreeSet<u16>,
    /// Statuses that terminate the operation immediately
    pub abort_on: Option<BTreeSet<u16>>,
    /// Decision for statuses outside every set
    pub on_unclassified: Decision,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_attempts: 3,
            continue_on: BTreeSet::new(),
            retry_on: [408, 429, 500, 502, 503, 504].into_iter().collect(),
            abort_on: None,
            on_unclassified: Decision::UnspecifiedRetry,
        }
    }
}

impl RetryConfig {
    /// Set the initial backoff.
    #[must_use]
    pub const fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the maximum number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Replace the acceptable-outcome statuses.
    #[must_use]
    pub fn with_continue_on(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.continue_on = codes.into_iter().collect();
        self
    }

    /// Replace the retriable statuses.
    #[must_use]
    pub fn with_retry_on(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retry_on = codes.into_iter().collect();
        self
    }

    /// Set the abort statuses.
    #[must_use]
    pub fn with_abort_on(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.abort_on = Some(codes.into_iter().collect());
        self
    }

    /// Set the decision for statuses outside every set.
    #[must_use]
    pub const fn with_unclassified(mut self, decision: Decision) -> Self {
        self.on_unclassified = decision;
        self
    }
}

/// Result of a retry run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// An attempt succeeded with this response.
    Success(T),
    /// An attempt failed with a `continue_on` status.
    Continued {
        /// The accepted status
        status: u16,
    },
    /// Every attempt failed with a retriable status.
    Exhausted {
        /// Number of invocations made
        attempts: u32,
        /// Status of the final attempt
        last_status: u16,
    },
}

impl<T> Outcome<T> {
    /// The recorded response, if any attempt succeeded.
    pub fn into_response(self) -> Option<T> {
        match self {
            Self::Success(response) => Some(response),
            Self::Continued { .. } | Self::Exhausted { .. } => None,
        }
    }

    /// Whether an attempt succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Failure of a retry run.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// A status listed in `abort_on` was returned.
    #[error("{operation} aborted by retry policy on status {status}")]
    PolicyViolation {
        /// Operation name
        operation: String,
        /// Status that triggered the abort
        status: u16,
        /// Failure reported by the operation
        #[source]
        source: E,
    },

    /// The operation failed without a status code.
    #[error(transparent)]
    Operation(E),

    /// The cancellation signal fired.
    #[error("{operation} cancelled before attempt {attempt}")]
    Cancelled {
        /// Operation name
        operation: String,
        /// Attempt that would have run next
        attempt: u32,
    },
}

impl<E> RetryError<E> {
    /// Status code that aborted the run, if this is a policy violation.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::PolicyViolation { status, .. } => Some(*status),
            Self::Operation(_) | Self::Cancelled { .. } => None,
        }
    }

    /// The underlying operation failure, if one was recorded.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::PolicyViolation { source, .. } | Self::Operation(source) => Some(source),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Validated, immutable retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Validate a configuration into a policy.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidInput`] if `max_attempts` is zero or a
    /// status code appears in more than one set.
    pub fn new(config: RetryConfig) -> Result<Self, PlatformError> {
        if config.max_attempts == 0 {
            return Err(PlatformError::invalid_input("max_attempts must be at least 1"));
        }

        let empty = BTreeSet::new();
        let abort_on = config.abort_on.as_ref().unwrap_or(&empty);
        let pairs = [
            ("continue_on", &config.continue_on, "retry_on", &config.retry_on),
            ("continue_on", &config.continue_on, "abort_on", abort_on),
            ("retry_on", &config.retry_on, "abort_on", abort_on),
        ];
        for (left_name, left, right_name, right) in pairs {
            if let Some(code) = left.intersection(right).next() {
                return Err(PlatformError::invalid_input(format!(
                    "status {code} appears in both {left_name} and {right_name}"
                )));
            }
        }

        Ok(Self { config })
    }

    /// Create a retry policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }

    /// A policy that invokes the operation once and never sleeps.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self {
            config: RetryConfig {
                initial_backoff: Duration::ZERO,
                max_attempts: 1,
                continue_on: BTreeSet::new(),
                retry_on: BTreeSet::new(),
                abort_on: None,
                on_unclassified: Decision::UnspecifiedRetry,
            },
        }
    }

    /// Configuration this policy was built from.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Get the maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Classify a failed attempt's status code.
    ///
    /// `continue_on` is checked first, then `retry_on`, then `abort_on`.
    #[must_use]
    pub fn classify(&self, status: u16) -> Decision {
        if self.config.continue_on.contains(&status) {
            Decision::Continue
        } else if self.config.retry_on.contains(&status) {
            Decision::Retry
        } else if self
            .config
            .abort_on
            .as_ref()
            .is_some_and(|codes| codes.contains(&status))
        {
            Decision::Abort
        } else {
            self.config.on_unclassified
        }
    }

    /// Delay slept before the given 0-based attempt.
    ///
    /// Attempt 0 runs immediately; attempt `k` waits `initial_backoff * 2^(k-1)`.
    #[must_use]
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        match attempt {
            0 => Duration::ZERO,
            k => {
                let factor = 1u32.checked_shl(k - 1).unwrap_or(u32::MAX);
                self.config.initial_backoff.saturating_mul(factor)
            }
        }
    }

    /// Execute an async operation under this policy.
    ///
    /// Returns the first successful response, or an [`Outcome`] without a
    /// response when a `continue_on` status stops the loop or every attempt
    /// fails with a retriable status.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::PolicyViolation`] on an `abort_on` status and
    /// [`RetryError::Operation`] on the first failure without a status code.
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation: &str,
        op: F,
    ) -> Result<Outcome<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StatusClassified + fmt::Display,
    {
        self.run(operation, op, None).await
    }

    /// Execute an async operation, stopping when `cancel` turns `true`.
    ///
    /// The signal is checked before every invocation and raced against every
    /// backoff sleep. A dropped sender never cancels.
    ///
    /// # Errors
    ///
    /// As [`RetryPolicy::execute`], plus [`RetryError::Cancelled`].
    pub async fn execute_with_cancel<F, Fut, T, E>(
        &self,
        operation: &str,
        op: F,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Outcome<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StatusClassified + fmt::Display,
    {
        self.run(operation, op, Some(&mut cancel)).await
    }

    #[instrument(skip_all, fields(operation = %operation, max_attempts = self.config.max_attempts))]
    async fn run<F, Fut, T, E>(
        &self,
        operation: &str,
        mut op: F,
        mut cancel: Option<&mut watch::Receiver<bool>>,
    ) -> Result<Outcome<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StatusClassified + fmt::Display,
    {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            if cancel.as_deref().is_some_and(|rx| *rx.borrow()) {
                warn!(attempt, "Cancelled before attempt");
                return Err(RetryError::Cancelled {
                    operation: operation.to_string(),
                    attempt,
                });
            }

            let error = match op().await {
                Ok(response) => {
                    debug!(attempt, "Attempt succeeded");
                    return Ok(Outcome::Success(response));
                }
                Err(error) => error,
            };

            let Some(status) = error.status_code() else {
                error!(attempt, error = %error, "Attempt failed without a status code");
                return Err(RetryError::Operation(error));
            };

            let decision = self.classify(status);
            match decision {
                Decision::Continue => {
                    info!(attempt, status, %decision, "Accepted status, stopping");
                    return Ok(Outcome::Continued { status });
                }
                Decision::Abort => {
                    error!(attempt, status, %decision, error = %error, "Abort status, giving up");
                    return Err(RetryError::PolicyViolation {
                        operation: operation.to_string(),
                        status,
                        source: error,
                    });
                }
                Decision::Retry | Decision::UnspecifiedRetry => {
                    if attempt >= self.config.max_attempts {
                        warn!(attempt, status, %decision, "Retry attempts exhausted");
                        return Ok(Outcome::Exhausted {
                            attempts: attempt,
                            last_status: status,
                        });
                    }
                    warn!(
                        attempt,
                        status,
                        %decision,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Retriable status, backing off"
                    );
                }
            }

            match cancel.as_deref_mut() {
                Some(rx) => {
                    tokio::select! {
                        () = tokio::time::sleep(backoff) => {}
                        () = cancelled(rx) => {
                            warn!(attempt, "Cancelled during backoff");
                            return Err(RetryError::Cancelled {
                                operation: operation.to_string(),
                                attempt: attempt + 1,
                            });
                        }
                    }
                }
                None => tokio::time::sleep(backoff).await,
            }
            backoff = backoff.saturating_mul(2);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Resolves once the signal turns `true`; pends forever if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn sample_policy() -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::default()
                .with_initial_backoff(Duration::from_secs(1))
                .with_max_attempts(4)
                .with_retry_on([429, 503])
                .with_continue_on([200])
                .with_abort_on([403]),
        )
        .unwrap()
    }

    /// Runs a scripted operation: codes below 300 succeed, the rest fail.
    async fn run_script(
        policy: &RetryPolicy,
        script: &[u16],
    ) -> (Result<Outcome<u16>, RetryError<PlatformError>>, Vec<Instant>) {
        let mut calls = Vec::new();
        let mut codes = script.iter().copied();
        let result = policy
            .execute("scripted", || {
                calls.push(Instant::now());
                let code = codes.next().unwrap_or(200);
                async move {
                    if code < 300 {
                        Ok(code)
                    } else {
                        Err(PlatformError::status(code, "scripted"))
                    }
                }
            })
            .await;
        (result, calls)
    }

    fn gaps(calls: &[Instant]) -> Vec<Duration> {
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert!(config.retry_on.contains(&503));
        assert_eq!(config.on_unclassified, Decision::UnspecifiedRetry);
    }

    #[test]
    fn test_classify() {
        let policy = sample_policy();
        assert_eq!(policy.classify(200), Decision::Continue);
        assert_eq!(policy.classify(429), Decision::Retry);
        assert_eq!(policy.classify(403), Decision::Abort);
        assert_eq!(policy.classify(500), Decision::UnspecifiedRetry);
    }

    #[test]
    fn test_unclassified_can_abort() {
        let policy =
            RetryPolicy::new(RetryConfig::default().with_unclassified(Decision::Abort)).unwrap();
        assert_eq!(policy.classify(418), Decision::Abort);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let result = RetryPolicy::new(RetryConfig::default().with_max_attempts(0));
        assert!(matches!(result, Err(PlatformError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_overlapping_sets() {
        let result = RetryPolicy::new(
            RetryConfig::default()
                .with_retry_on([429, 503])
                .with_abort_on([503]),
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("503"));

        let result = RetryPolicy::new(
            RetryConfig::default()
                .with_retry_on([503])
                .with_continue_on([200, 404])
                .with_abort_on([404]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_delay_before_attempt() {
        let policy = sample_policy();
        assert_eq!(policy.delay_before_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_before_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_before_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = sample_policy();
        assert!(policy.delay_before_attempt(200) >= policy.delay_before_attempt(32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_success() {
        let (result, calls) = run_script(&sample_policy(), &[503, 429, 200]).await;
        assert_eq!(result.unwrap(), Outcome::Success(200));
        assert_eq!(calls.len(), 3);
        assert_eq!(gaps(&calls), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_status() {
        let start = Instant::now();
        let (result, calls) = run_script(&sample_policy(), &[403, 200]).await;
        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(matches!(err, RetryError::PolicyViolation { .. }));
        assert_eq!(calls.len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_absent_response() {
        let start = Instant::now();
        let (result, calls) = run_script(&sample_policy(), &[503, 503, 503, 503, 200]).await;
        let outcome = result.unwrap();
        assert_eq!(
            outcome,
            Outcome::Exhausted {
                attempts: 4,
                last_status: 503
            }
        );
        assert_eq!(outcome.into_response(), None);
        assert_eq!(calls.len(), 4);
        assert_eq!(
            gaps(&calls),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_status_is_retried() {
        let (result, calls) = run_script(&sample_policy(), &[500, 201]).await;
        assert_eq!(result.unwrap(), Outcome::Success(201));
        assert_eq!(gaps(&calls), vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_status_stops() {
        let policy = RetryPolicy::new(
            RetryConfig::default()
                .with_max_attempts(5)
                .with_retry_on([503])
                .with_continue_on([404]),
        )
        .unwrap();
        let (result, calls) = run_script(&policy, &[503, 404, 503]).await;
        assert_eq!(result.unwrap(), Outcome::Continued { status: 404 });
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy() {
        let start = Instant::now();
        let (result, calls) = run_script(&RetryPolicy::single_attempt(), &[503, 200]).await;
        assert!(matches!(result.unwrap(), Outcome::Exhausted { attempts: 1, .. }));
        assert_eq!(calls.len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_error_without_status_is_fatal() {
        let mut invocations = 0;
        let result: Result<Outcome<()>, _> = sample_policy()
            .execute("fatal", || {
                invocations += 1;
                async { Err(PlatformError::Internal("connection reset".to_string())) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Operation(PlatformError::Internal(_)))));
        assert_eq!(invocations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let (tx, rx) = watch::channel(false);
        let policy = sample_policy();
        let mut invocations = 0;
        let run = policy.execute_with_cancel(
            "cancellable",
            || {
                invocations += 1;
                async { Err::<(), _>(PlatformError::status(503, "busy")) }
            },
            rx,
        );
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            tx.send_replace(true);
        };
        let (result, ()) = tokio::join!(run, cancel);
        assert!(matches!(
            result,
            Err(RetryError::Cancelled { attempt: 2, .. })
        ));
        assert_eq!(invocations, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let (_tx, rx) = watch::channel(true);
        let mut invocations = 0;
        let result = sample_policy()
            .execute_with_cancel(
                "cancelled",
                || {
                    invocations += 1;
                    async { Ok::<_, PlatformError>(()) }
                },
                rx,
            )
            .await;
        assert!(matches!(result, Err(RetryError::Cancelled { attempt: 1, .. })));
        assert_eq!(invocations, 0);
    }
}
