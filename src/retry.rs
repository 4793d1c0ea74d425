/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Retry policy for reminder delivery.
//!
//! The policy is evaluated against the attempt counter persisted on the
//! reminder row, never against in-memory state, so retry behavior survives
//! process restarts. Delays grow exponentially (`initial * base^attempt`),
//! are capped at `max_delay`, and optionally carry jitter to avoid
//! thundering-herd redeliveries after an outage.

use rand::Rng;
use std::time::Duration;

/// Backoff strategy for computing the delay before the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// The same delay for every attempt
    Fixed,
    /// Delay grows by `initial * base^attempt`
    Exponential { base: f64 },
}

/// Bounded retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts before dead-lettering
    pub max_attempts: i32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any computed delay
    pub max_delay: Duration,
    /// How the delay grows across attempts
    pub backoff: BackoffStrategy,
    /// Whether to randomize the delay within +/- 25%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(15 * 60),
            backoff: BackoffStrategy::Exponential { base: 2.0 },
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a builder for constructing a custom policy.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Computes the delay before the next attempt.
    ///
    /// `attempt` is the number of attempts already made (the persisted
    /// counter), so the first retry is computed with `attempt = 1`.
    pub fn calculate_delay(&self, attempt: i32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let base_delay = match self.backoff {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Exponential { base } => {
                let factor = base.powi(exponent);
                Duration::from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            }
        };

        let capped = base_delay.min(self.max_delay);

        if self.jitter {
            // +/- 25% around the computed delay
            let jitter_factor = rand::thread_rng().gen_range(0.75..=1.25);
            Duration::from_secs_f64(capped.as_secs_f64() * jitter_factor).min(self.max_delay)
        } else {
            capped
        }
    }

    /// Whether the retry budget is exhausted for the given attempt count.
    pub fn is_exhausted(&self, attempt: i32) -> bool {
        attempt >= self.max_attempts
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<i32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    backoff: Option<BackoffStrategy>,
    jitter: Option<bool>,
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: self.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            backoff: self.backoff.unwrap_or(defaults.backoff),
            jitter: self.jitter.unwrap_or(defaults.jitter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubling_without_jitter() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_secs(60))
            .max_delay(Duration::from_secs(3600))
            .backoff(BackoffStrategy::Exponential { base: 2.0 })
            .jitter(false)
            .build();

        assert_eq!(policy.calculate_delay(1), Duration::from_secs(60));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(120));
        assert_eq!(policy.calculate_delay(3), Duration::from_secs(240));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_secs(60))
            .max_delay(Duration::from_secs(120))
            .backoff(BackoffStrategy::Exponential { base: 2.0 })
            .jitter(false)
            .build();

        assert_eq!(policy.calculate_delay(10), Duration::from_secs(120));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_secs(100))
            .max_delay(Duration::from_secs(3600))
            .jitter(true)
            .build();

        for _ in 0..50 {
            let delay = policy.calculate_delay(1);
            assert!(delay >= Duration::from_secs(75));
            assert!(delay <= Duration::from_secs(125));
        }
    }

    #[test]
    fn exhaustion_at_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }
}
