//! Retry delays for failed deliveries.
//!
//! The delay after the `n`th failed attempt is
//! `initial_delay * multiplier^(n-1)`, capped at `max_delay`, then spread
//! by the configured jitter so that jobs which failed together do not
//! retry together.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a computed delay is randomized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// Use the computed delay as is.
    None,
    /// Anywhere between zero and the computed delay.
    Full,
    /// Half the computed delay plus up to another half.
    #[default]
    Equal,
}

/// Exponential backoff with a cap and an attempt budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    #[serde(with = "vitalgate_core::duration")]
    pub initial_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "vitalgate_core::duration")]
    pub max_delay: Duration,
    /// Attempts allowed before a job is marked permanently failed.
    pub max_attempts: u32,
    pub jitter: Jitter,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3600),
            max_attempts: 10,
            jitter: Jitter::Equal,
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// True once `attempts` failed attempts use up the budget.
    #[must_use]
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Delay after `attempt` failures, before jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * factor;
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Jittered delay after `attempt` failures.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// Like [`BackoffPolicy::delay`] with a caller-supplied random source.
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        match self.jitter {
            Jitter::None => base,
            Jitter::Full => base.mul_f64(rng.gen_range(0.0..=1.0)).min(base),
            Jitter::Equal => {
                let half = base / 2;
                (half + half.mul_f64(rng.gen_range(0.0..=1.0))).min(base)
            }
        }
    }
}
