//! # Retry Backoff
//!
//! Computes the requeue delay after a failed reconciliation pass.
//!
//! Each consecutive failure doubles the previous delay, starting from a
//! one-second baseline and capped at six hours: 2s, 4s, 8s, ... 6h.
//! The previous delay is persisted in `status.reconcileStatus.retryIntervalSeconds`,
//! so the sequence survives controller restarts and is not shortened by
//! watch events arriving before the scheduled retry.

use chrono::{DateTime, Utc};
use crds::{ConditionStatus, ReconcileStatus};
use std::time::Duration;

/// Baseline used after a success or on the first failure
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound for any failure delay
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Delay used when the status itself could not be written
pub const STATUS_WRITE_RETRY: Duration = Duration::from_secs(1);

/// Computes the delay before retrying a failed pass.
///
/// `previous` is the reconcile status as it was before the current failure
/// is recorded. A previous outcome other than `Failed` resets the sequence.
/// Status written without `retryIntervalSeconds` falls back to the time
/// elapsed since its `lastUpdate`, rounded to the second.
pub fn retry_interval(previous: &ReconcileStatus, now: DateTime<Utc>) -> Duration {
    let baseline = match (previous.status, previous.last_update) {
        (Some(ConditionStatus::Failed), Some(last_update)) => previous
            .retry_interval_seconds
            .map_or_else(|| elapsed_rounded(last_update, now), Duration::from_secs),
        _ => MIN_RETRY_INTERVAL,
    };

    baseline
        .max(MIN_RETRY_INTERVAL)
        .saturating_mul(2)
        .min(MAX_RETRY_INTERVAL)
}

fn elapsed_rounded(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let millis = (now - since).num_milliseconds().max(0);
    let seconds = u64::try_from((millis + 500) / 1000).unwrap_or(0);
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn failed(last_update: DateTime<Utc>, retry: Option<u64>) -> ReconcileStatus {
        ReconcileStatus {
            status: Some(ConditionStatus::Failed),
            last_update: Some(last_update),
            reason: "boom".to_string(),
            retry_interval_seconds: retry,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid timestamp")
    }

    #[test]
    fn test_first_failure_starts_at_two_seconds() {
        assert_eq!(retry_interval(&ReconcileStatus::default(), now()), Duration::from_secs(2));
    }

    #[test]
    fn test_success_resets_sequence() {
        let previous = ReconcileStatus {
            status: Some(ConditionStatus::True),
            last_update: Some(now() - chrono::Duration::hours(3)),
            reason: String::new(),
            retry_interval_seconds: None,
        };
        assert_eq!(retry_interval(&previous, now()), Duration::from_secs(2));
    }

    #[test]
    fn test_consecutive_failures_double_until_cap() {
        let mut status = ReconcileStatus::default();
        let mut last = Duration::ZERO;
        let mut expected = 2;

        for _ in 0..20 {
            let delay = retry_interval(&status, now());
            assert!(delay >= last, "backoff must never shrink: {:?} < {:?}", delay, last);
            assert!(delay <= MAX_RETRY_INTERVAL);
            assert_eq!(delay, Duration::from_secs(expected.min(6 * 60 * 60)));

            status = failed(now(), Some(delay.as_secs()));
            last = delay;
            expected *= 2;
        }
        assert_eq!(last, MAX_RETRY_INTERVAL);
    }

    #[test]
    fn test_early_retry_does_not_shorten_delay() {
        // a watch event re-triggered the pass only 1s after a 64s delay was scheduled
        let previous = failed(now() - chrono::Duration::seconds(1), Some(64));
        assert_eq!(retry_interval(&previous, now()), Duration::from_secs(128));
    }

    #[test]
    fn test_falls_back_to_elapsed_time() {
        let previous = failed(now() - chrono::Duration::milliseconds(9_600), None);
        assert_eq!(retry_interval(&previous, now()), Duration::from_secs(20));
    }

    #[test]
    fn test_elapsed_time_is_capped() {
        let previous = failed(now() - chrono::Duration::days(2), None);
        assert_eq!(retry_interval(&previous, now()), MAX_RETRY_INTERVAL);
    }
}
