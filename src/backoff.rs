/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A policy consulted by the Probe stage after every failed readiness probe.
///
/// Given the cancellation token governing the Probe stage and the 1-based attempt number that
/// just failed, a [`ReadyCheckBackoff`] decides whether to keep retrying (returning the delay
/// before the next attempt) or to give up (returning an error, which the Probe stage propagates
/// as [`crate::ExitCode::Internal`]).
pub trait ReadyCheckBackoff: Send + Sync {
    /// Computes the delay before the next probe attempt, or a terminal error.
    ///
    /// # Errors
    ///
    /// Returns an error to abandon the readiness wait entirely. This is the only way a backoff
    /// policy can fail a run short of the Probe stage's own token cancellation.
    fn next_delay(&self, token: &CancellationToken, attempt: u32) -> Result<Duration, BackoffError>;
}

/// Raised by a [`ReadyCheckBackoff`] to abandon readiness probing entirely.
#[derive(Clone, Debug, thiserror::Error)]
#[error("readiness backoff policy gave up after {attempt} attempt(s): {reason}")]
pub struct BackoffError {
    /// The attempt number the policy gave up on.
    pub attempt: u32,
    /// A human-readable reason, surfaced in logs.
    pub reason: String,
}

/// A constant delay between every probe attempt.
#[derive(Clone, Copy, Debug)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    /// Creates a policy that waits `delay` before every retry, indefinitely.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ReadyCheckBackoff for FixedBackoff {
    fn next_delay(&self, _token: &CancellationToken, _attempt: u32) -> Result<Duration, BackoffError> {
        Ok(self.delay)
    }
}

/// A delay that grows linearly with the attempt number: `increment * attempt`.
#[derive(Clone, Copy, Debug)]
pub struct LinearBackoff {
    increment: Duration,
}

impl LinearBackoff {
    /// Creates a policy whose `n`th retry waits `increment * n`.
    #[must_use]
    pub const fn new(increment: Duration) -> Self {
        Self { increment }
    }
}

impl ReadyCheckBackoff for LinearBackoff {
    fn next_delay(&self, _token: &CancellationToken, attempt: u32) -> Result<Duration, BackoffError> {
        Ok(self.increment.saturating_mul(attempt))
    }
}

/// A delay that doubles with every attempt: `base * 2^(attempt-1)`.
#[derive(Clone, Copy, Debug)]
pub struct ExponentialBackoff {
    base: Duration,
}

impl ExponentialBackoff {
    /// Creates a policy whose `n`th retry waits `base * 2^(n-1)`.
    #[must_use]
    pub const fn new(base: Duration) -> Self {
        Self { base }
    }
}

impl ReadyCheckBackoff for ExponentialBackoff {
    fn next_delay(&self, _token: &CancellationToken, attempt: u32) -> Result<Duration, BackoffError> {
        let exponent = attempt.saturating_sub(1).min(31);
        Ok(self.base.saturating_mul(1u32 << exponent))
    }
}

/// The default readiness backoff: linear, 100 ms per attempt.
#[must_use]
pub fn default_backoff() -> Box<dyn ReadyCheckBackoff> {
    Box::new(LinearBackoff::new(Duration::from_millis(100)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt_delays(policy: &dyn ReadyCheckBackoff, attempts: u32) -> Vec<Duration> {
        let token = CancellationToken::new();
        (1..=attempts)
            .map(|attempt| policy.next_delay(&token, attempt).unwrap())
            .collect()
    }

    #[test]
    fn fixed_backoff_never_changes() {
        let policy = FixedBackoff::new(Duration::from_millis(50));
        assert_eq!(
            attempt_delays(&policy, 3),
            vec![Duration::from_millis(50); 3]
        );
    }

    #[test]
    fn linear_backoff_grows_by_a_constant_increment() {
        let policy = LinearBackoff::new(Duration::from_millis(10));
        assert_eq!(
            attempt_delays(&policy, 3),
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30),
            ]
        );
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let policy = ExponentialBackoff::new(Duration::from_millis(5));
        assert_eq!(
            attempt_delays(&policy, 4),
            vec![
                Duration::from_millis(5),
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
            ]
        );
    }
}
