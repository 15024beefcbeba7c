use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{Backoff, BackoffStrategy};
use crate::response::Response;

/// Decides, from the last response, whether another attempt should be made.
pub trait RetryTrigger: Send + Sync {
    fn should_retry(&self, response: &Response) -> bool;
}

impl<F> RetryTrigger for F
where
    F: Fn(&Response) -> bool + Send + Sync,
{
    fn should_retry(&self, response: &Response) -> bool {
        self(response)
    }
}

/// How many attempts a request may take, how long to wait between them, and
/// which responses justify another attempt.
///
/// A policy without triggers never retries, not even on transport errors.
/// Opt in with [`triggers::on_error`] or a custom predicate.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Arc<dyn Backoff>,
    triggers: Vec<Arc<dyn RetryTrigger>>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("triggers", &self.triggers.len())
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff: impl Backoff + 'static) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
            triggers: Vec::new(),
        }
    }

    pub fn with_shared_backoff(max_attempts: usize, backoff: Arc<dyn Backoff>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            triggers: Vec::new(),
        }
    }

    /// The single-attempt policy.
    pub fn disabled() -> Self {
        Self::new(1, BackoffStrategy::constant(Duration::ZERO, false))
    }

    pub fn trigger(mut self, trigger: impl RetryTrigger + 'static) -> Self {
        self.triggers.push(Arc::new(trigger));
        self
    }

    pub fn shared_trigger(mut self, trigger: Arc<dyn RetryTrigger>) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn triggers(mut self, triggers: impl IntoIterator<Item = Arc<dyn RetryTrigger>>) -> Self {
        self.triggers.extend(triggers);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff(&self) -> &dyn Backoff {
        self.backoff.as_ref()
    }

    /// True for policies that allow a single attempt; the pipeline skips
    /// body buffering and backoff for them.
    pub fn is_disabled(&self) -> bool {
        self.max_attempts <= 1
    }

    pub fn should_retry(&self, response: &Response) -> bool {
        if self.triggers.is_empty() {
            return false;
        }
        self.triggers
            .iter()
            .any(|trigger| trigger.should_retry(response))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Stock retry predicates.
pub mod triggers {
    use http::StatusCode;

    use crate::response::Response;

    /// Retries whenever the error slot is populated.
    pub fn on_error() -> impl Fn(&Response) -> bool + Send + Sync + 'static {
        |response: &Response| response.error().is_some()
    }

    /// Retries network failures and attempt timeouts, but not cancellations or
    /// hook rejections.
    pub fn on_transport_error() -> impl Fn(&Response) -> bool + Send + Sync + 'static {
        |response: &Response| response.error().is_some_and(|error| error.is_transport())
    }

    /// Retries any 5xx response.
    pub fn on_server_error() -> impl Fn(&Response) -> bool + Send + Sync + 'static {
        |response: &Response| {
            response.error().is_none()
                && response
                    .status()
                    .is_some_and(|status| status.is_server_error())
        }
    }

    pub fn on_status(
        statuses: impl IntoIterator<Item = StatusCode>,
    ) -> impl Fn(&Response) -> bool + Send + Sync + 'static {
        let statuses: Vec<StatusCode> = statuses.into_iter().collect();
        move |response: &Response| {
            response.error().is_none()
                && response
                    .status()
                    .is_some_and(|status| statuses.contains(&status))
        }
    }
}
