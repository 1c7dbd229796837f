//! Property-based tests for rust-common crate.
//!
//! These tests verify the retry executor's decisions and backoff schedule
//! across generated status sequences using proptest.

use std::collections::BTreeSet;
use std::time::Duration;

use proptest::prelude::*;
use rust_common::{Decision, Outcome, PlatformError, RetryConfig, RetryError, RetryPolicy};
use tokio::time::Instant;

const RETRY_ON: [u16; 3] = [429, 502, 503];
const ABORT_ON: [u16; 2] = [401, 403];

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

fn policy(initial_ms: u64, max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        RetryConfig::default()
            .with_initial_backoff(Duration::from_millis(initial_ms))
            .with_max_attempts(max_attempts)
            .with_retry_on(RETRY_ON)
            .with_continue_on([404])
            .with_abort_on(ABORT_ON),
    )
    .unwrap()
}

/// Codes below 300 succeed; the rest fail with that status.
async fn run_script(
    policy: &RetryPolicy,
    script: &[u16],
) -> (Result<Outcome<u16>, RetryError<PlatformError>>, Vec<Instant>) {
    let mut calls = Vec::new();
    let mut codes = script.iter().copied();
    let result = policy
        .execute("property", || {
            calls.push(Instant::now());
            let code = codes.next().unwrap_or(200);
            async move {
                if code < 300 {
                    Ok(code)
                } else {
                    Err(PlatformError::status(code, "generated"))
                }
            }
        })
        .await;
    (result, calls)
}

fn retry_code() -> impl Strategy<Value = u16> {
    prop::sample::select(RETRY_ON.to_vec())
}

fn abort_code() -> impl Strategy<Value = u16> {
    prop::sample::select(ABORT_ON.to_vec())
}

// *For any* run of retriable failures followed by a success within
// `max_attempts`, the delay before attempt k SHALL equal initial * 2^(k-1)
// and the returned response SHALL be the successful one.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_backoff_doubles_until_success(
        initial_ms in 1u64..2_000,
        failures in prop::collection::vec(retry_code(), 0..6),
        extra in 1u32..4,
    ) {
        let max_attempts = u32::try_from(failures.len()).unwrap() + extra;
        let policy = policy(initial_ms, max_attempts);
        let mut script = failures.clone();
        script.push(201);

        let (result, calls) = paused_runtime().block_on(run_script(&policy, &script));

        prop_assert_eq!(result.unwrap(), Outcome::Success(201));
        prop_assert_eq!(calls.len(), failures.len() + 1);
        for (k, pair) in calls.windows(2).enumerate() {
            let attempt = u32::try_from(k + 1).unwrap();
            let expected = Duration::from_millis(initial_ms * (1 << k));
            prop_assert_eq!(pair[1] - pair[0], expected);
            prop_assert_eq!(policy.delay_before_attempt(attempt), expected);
        }
    }

    #[test]
    fn prop_abort_stops_immediately(
        failures in prop::collection::vec(retry_code(), 0..4),
        abort in abort_code(),
    ) {
        let policy = policy(10, 10);
        let mut script = failures.clone();
        script.push(abort);
        script.push(200);

        let (result, calls) = paused_runtime().block_on(run_script(&policy, &script));

        let err = result.unwrap_err();
        prop_assert_eq!(err.status(), Some(abort));
        let is_violation = matches!(err, RetryError::PolicyViolation { .. });
        prop_assert!(is_violation);
        prop_assert_eq!(calls.len(), failures.len() + 1);
    }

    #[test]
    fn prop_exhaustion_returns_absent_response(
        max_attempts in 1u32..7,
        code in prop_oneof![retry_code(), Just(500u16), Just(418u16)],
    ) {
        let policy = policy(5, max_attempts);
        let script = vec![code; usize::try_from(max_attempts).unwrap() + 2];

        let (result, calls) = paused_runtime().block_on(run_script(&policy, &script));

        let outcome = result.unwrap();
        prop_assert_eq!(
            outcome.clone(),
            Outcome::Exhausted { attempts: max_attempts, last_status: code }
        );
        prop_assert_eq!(outcome.into_response(), None);
        prop_assert_eq!(calls.len(), usize::try_from(max_attempts).unwrap());
        // No sleep follows the final attempt.
        let slept: Duration = (1..max_attempts).map(|k| policy.delay_before_attempt(k)).sum();
        prop_assert_eq!(calls[calls.len() - 1] - calls[0], slept);
    }

    #[test]
    fn prop_single_attempt_invokes_once(code in 100u16..600) {
        let (result, calls) =
            paused_runtime().block_on(run_script(&RetryPolicy::single_attempt(), &[code, 200]));

        prop_assert_eq!(calls.len(), 1);
        if code < 300 {
            prop_assert_eq!(result.unwrap(), Outcome::Success(code));
        } else {
            prop_assert_eq!(
                result.unwrap(),
                Outcome::Exhausted { attempts: 1, last_status: code }
            );
        }
    }

    #[test]
    fn prop_classification_follows_membership(
        continue_on in prop::collection::btree_set(100u16..200, 0..5),
        retry_on in prop::collection::btree_set(200u16..300, 0..5),
        abort_on in prop::collection::btree_set(300u16..400, 0..5),
        status in 100u16..500,
    ) {
        let policy = RetryPolicy::new(
            RetryConfig::default()
                .with_continue_on(continue_on.clone())
                .with_retry_on(retry_on.clone())
                .with_abort_on(abort_on.clone()),
        )
        .unwrap();

        let expected = if continue_on.contains(&status) {
            Decision::Continue
        } else if retry_on.contains(&status) {
            Decision::Retry
        } else if abort_on.contains(&status) {
            Decision::Abort
        } else {
            Decision::UnspecifiedRetry
        };
        prop_assert_eq!(policy.classify(status), expected);
    }

    #[test]
    fn prop_overlapping_sets_rejected(
        shared in 400u16..600,
        others in prop::collection::btree_set(100u16..300, 0..4),
    ) {
        let mut retry_on: BTreeSet<u16> = others;
        retry_on.insert(shared);
        let result = RetryPolicy::new(
            RetryConfig::default()
                .with_retry_on(retry_on)
                .with_abort_on([shared]),
        );
        let rejected = matches!(result, Err(PlatformError::InvalidInput(_)));
        prop_assert!(rejected);
    }
}

/// Policy from the reference scenario: 1s initial, 4 attempts.
fn reference_policy() -> RetryPolicy {
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

#[tokio::test(start_paused = true)]
async fn test_reference_scenario_recovers() {
    let (result, calls) = run_script(&reference_policy(), &[503, 429, 200]).await;
    assert_eq!(result.unwrap().into_response(), Some(200));
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1] - calls[0], Duration::from_secs(1));
    assert_eq!(calls[2] - calls[1], Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_reference_scenario_aborts() {
    let start = Instant::now();
    let (result, calls) = run_script(&reference_policy(), &[403]).await;
    assert!(matches!(
        result,
        Err(RetryError::PolicyViolation { status: 403, .. })
    ));
    assert_eq!(calls.len(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_reference_scenario_exhausts() {
    let start = Instant::now();
    let (result, calls) = run_script(&reference_policy(), &[503, 503, 503, 503]).await;
    assert_eq!(result.unwrap().into_response(), None);
    assert_eq!(calls.len(), 4);
    assert_eq!(start.elapsed(), Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_policy_violation_keeps_source() {
    let (result, _) = run_script(&reference_policy(), &[403]).await;
    let err = result.unwrap_err();
    assert_eq!(
        err.to_string(),
        "property aborted by retry policy on status 403"
    );
    let source = err.into_source().unwrap();
    assert!(matches!(source, PlatformError::Status { code: 403, .. }));
}
