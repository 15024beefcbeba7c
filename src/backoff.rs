//! Wait-time strategies used between retry attempts.

use std::time::Duration;

use rand::RngExt;

use crate::response::Response;

/// Computes how long to wait before the next attempt.
///
/// `attempt` is zero-based: it is the index of the attempt that just finished.
/// Implementations must not block and must never return a negative duration.
pub trait Backoff: Send + Sync {
    fn wait_time(&self, attempt: usize, last_response: Option<&Response>) -> Duration;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Waits `initial`, or a value in `[initial/2, initial/2 + initial)` when
    /// jittered.
    Constant { initial: Duration, jitter: bool },
    /// Waits `min(max, initial * 2^attempt)`. With jitter the result lies in
    /// `[capped/2, capped)`; jitter is applied after the cap.
    Exponential {
        initial: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl BackoffStrategy {
    pub const fn constant(initial: Duration, jitter: bool) -> Self {
        Self::Constant { initial, jitter }
    }

    pub const fn exponential(initial: Duration, max: Duration, jitter: bool) -> Self {
        Self::Exponential {
            initial,
            max,
            jitter,
        }
    }

    fn constant_wait(initial: Duration, jitter: bool) -> Duration {
        if !jitter {
            return initial;
        }
        let initial_nanos = duration_nanos(initial);
        if initial_nanos == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::rng();
        let sampled = rng.random_range(0..initial_nanos);
        Duration::from_nanos((initial_nanos / 2).saturating_add(sampled))
    }

    fn exponential_wait(
        initial: Duration,
        max: Duration,
        jitter: bool,
        attempt: usize,
    ) -> Duration {
        let capped = capped_exponential_nanos(initial, max, attempt);
        if !jitter {
            return Duration::from_nanos(capped);
        }
        let half = capped / 2;
        if half == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::rng();
        Duration::from_nanos(half + rng.random_range(0..half))
    }
}

impl Backoff for BackoffStrategy {
    fn wait_time(&self, attempt: usize, _last_response: Option<&Response>) -> Duration {
        match *self {
            Self::Constant { initial, jitter } => Self::constant_wait(initial, jitter),
            Self::Exponential {
                initial,
                max,
                jitter,
            } => Self::exponential_wait(initial, max, jitter, attempt),
        }
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    duration.as_nanos().min(u64::MAX as u128) as u64
}

fn capped_exponential_nanos(initial: Duration, max: Duration, attempt: usize) -> u64 {
    let initial_nanos = duration_nanos(initial);
    let max_nanos = duration_nanos(max);
    let exponent = attempt.min(63) as u32;
    let grown = initial_nanos.saturating_mul(1_u64 << exponent);
    grown.min(max_nanos)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Backoff, BackoffStrategy};

    #[test]
    fn constant_without_jitter_is_exact_for_every_attempt() {
        let backoff = BackoffStrategy::constant(Duration::from_millis(200), false);
        for attempt in 0..32 {
            assert_eq!(backoff.wait_time(attempt, None), Duration::from_millis(200));
        }
    }

    #[test]
    fn constant_with_jitter_stays_within_shifted_range() {
        let initial = Duration::from_millis(100);
        let backoff = BackoffStrategy::constant(initial, true);
        for attempt in 0..512 {
            let wait = backoff.wait_time(attempt, None);
            assert!(wait >= initial / 2, "wait {wait:?} below lower bound");
            assert!(wait < initial / 2 + initial, "wait {wait:?} above upper bound");
        }
    }

    #[test]
    fn constant_with_zero_duration_and_jitter_is_zero() {
        let backoff = BackoffStrategy::constant(Duration::ZERO, true);
        assert_eq!(backoff.wait_time(3, None), Duration::ZERO);
    }

    #[test]
    fn exponential_without_jitter_doubles_until_cap() {
        let initial = Duration::from_millis(10);
        let max = Duration::from_millis(500);
        let backoff = BackoffStrategy::exponential(initial, max, false);

        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let wait = backoff.wait_time(attempt, None);
            let expected = (initial * 2_u32.saturating_pow(attempt.min(31) as u32)).min(max);
            assert_eq!(wait, expected, "attempt {attempt}");
            assert!(wait >= previous);
            previous = wait;
        }
        assert_eq!(backoff.wait_time(7, None), max);
        assert_eq!(backoff.wait_time(1_000, None), max);
    }

    #[test]
    fn exponential_with_jitter_respects_lower_bound() {
        let initial = Duration::from_millis(10);
        let max = Duration::from_millis(300);
        let backoff = BackoffStrategy::exponential(initial, max, true);

        for attempt in 0..12 {
            let capped = BackoffStrategy::exponential(initial, max, false).wait_time(attempt, None);
            for _ in 0..64 {
                let wait = backoff.wait_time(attempt, None);
                assert!(wait >= capped / 2, "attempt {attempt}: {wait:?} < {capped:?}/2");
            }
        }
    }

    #[test]
    fn exponential_handles_huge_attempt_numbers_without_overflow() {
        let backoff =
            BackoffStrategy::exponential(Duration::from_secs(1), Duration::from_secs(30), false);
        assert_eq!(backoff.wait_time(usize::MAX, None), Duration::from_secs(30));
    }
}
