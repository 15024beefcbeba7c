use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::context::Context;
use crate::error::BoxError;
use crate::limiter::Limiter;
use crate::request::Request;
use crate::util::lock_unpoisoned;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimitPolicy {
    requests_per_second: f64,
    burst: usize,
}

impl RateLimitPolicy {
    pub const fn standard() -> Self {
        Self {
            requests_per_second: 50.0,
            burst: 50,
        }
    }

    pub fn requests_per_second(mut self, requests_per_second: f64) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }

    pub const fn burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }

    pub fn configured_requests_per_second(self) -> f64 {
        self.requests_per_second
    }

    pub const fn configured_burst(self) -> usize {
        self.burst
    }

    fn normalize(self) -> Self {
        Self {
            requests_per_second: if self.requests_per_second.is_finite()
                && self.requests_per_second > 0.0
            {
                self.requests_per_second
            } else {
                1.0
            },
            burst: self.burst.max(1),
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Longest single sleep before the bucket is polled again.
const MAX_TOKEN_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct TokenBucket {
    policy: RateLimitPolicy,
    tokens: f64,
    last_refill_at: Instant,
}

impl TokenBucket {
    fn new(policy: RateLimitPolicy, now: Instant) -> Self {
        let policy = policy.normalize();
        Self {
            policy,
            tokens: policy.configured_burst() as f64,
            last_refill_at: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill_at {
            return;
        }
        let elapsed_secs = now.duration_since(self.last_refill_at).as_secs_f64();
        self.last_refill_at = now;
        let replenished = elapsed_secs * self.policy.configured_requests_per_second();
        self.tokens = (self.tokens + replenished).min(self.policy.configured_burst() as f64);
    }

    /// Takes a token if one is ready, otherwise reports how long until the
    /// next one.
    fn acquire(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            return Duration::ZERO;
        }
        let rate = self.policy.configured_requests_per_second();
        if rate <= f64::EPSILON {
            return MAX_TOKEN_WAIT;
        }
        let needed_tokens = (1.0 - self.tokens).max(0.0);
        let delay_secs = needed_tokens / rate;
        if delay_secs <= f64::EPSILON {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(delay_secs)
                .map_or(MAX_TOKEN_WAIT, |delay| delay.min(MAX_TOKEN_WAIT))
        }
    }
}

/// Token-bucket limiter shared by every request of a client.
///
/// `allow` never grants the fast path, so every request consumes a token.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    bucket: Mutex<TokenBucket>,
}

impl TokenBucketLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(policy, Instant::now())),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        lock_unpoisoned(&self.bucket).policy
    }

    fn acquire(&self) -> Duration {
        lock_unpoisoned(&self.bucket).acquire(Instant::now())
    }
}

impl Limiter for TokenBucketLimiter {
    fn allow(&self, _request: &Request) -> bool {
        false
    }

    fn wait<'a>(&'a self, context: &'a Context) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            loop {
                let delay = self.acquire();
                if delay.is_zero() {
                    return Ok(());
                }
                debug!(delay_ms = delay.as_millis() as u64, "rate limiter waiting for token");
                context.sleep(delay).await?;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{MAX_TOKEN_WAIT, RateLimitPolicy, TokenBucket, TokenBucketLimiter};
    use crate::context::Context;
    use crate::limiter::Limiter;

    #[test]
    fn bucket_starts_full_then_spaces_tokens_by_rate() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(
            RateLimitPolicy::standard()
                .requests_per_second(10.0)
                .burst(2),
            start,
        );
        assert_eq!(bucket.acquire(start), Duration::ZERO);
        assert_eq!(bucket.acquire(start), Duration::ZERO);

        let wait = bucket.acquire(start);
        assert!(wait > Duration::from_millis(99) && wait <= Duration::from_millis(100));

        assert_eq!(bucket.acquire(start + Duration::from_millis(100)), Duration::ZERO);
    }

    #[test]
    fn invalid_policy_values_are_normalized() {
        let bucket = TokenBucket::new(
            RateLimitPolicy::standard()
                .requests_per_second(f64::NAN)
                .burst(0),
            Instant::now(),
        );
        assert_eq!(bucket.policy.configured_requests_per_second(), 1.0);
        assert_eq!(bucket.policy.configured_burst(), 1);
    }

    #[test]
    fn tiny_rates_wait_at_most_the_poll_interval() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(
            RateLimitPolicy::standard()
                .requests_per_second(1e-20)
                .burst(1),
            start,
        );
        assert_eq!(bucket.acquire(start), Duration::ZERO);
        assert_eq!(bucket.acquire(start), MAX_TOKEN_WAIT);
        assert_eq!(bucket.acquire(start + Duration::from_secs(3600)), MAX_TOKEN_WAIT);
    }

    #[tokio::test]
    async fn wait_is_cancellable() {
        let limiter = TokenBucketLimiter::new(
            RateLimitPolicy::standard()
                .requests_per_second(0.1)
                .burst(1),
        );
        let context = Context::new();
        limiter.wait(&context).await.expect("burst token");

        context.cancel();
        let error = limiter
            .wait(&context)
            .await
            .expect_err("cancelled context ends the wait");
        assert_eq!(error.to_string(), "context cancelled");
    }
}
