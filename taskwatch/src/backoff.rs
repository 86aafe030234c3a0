//! Delay strategies between two status fetches of the same job.
//!
//! This module provides three strategies:
//!
//! 1. Constant
//! 2. Linear
//! 3. Exponential
//!
//! each which can be optionally modified by applying different types of jitter.
//!
//! All of the constructors and configuration functions are `const`.
//!
//! # Example
//!
//! ```
//! # use taskwatch::backoff::{Jitter, PollDelay};
//! # use std::time::Duration;
//! let delay = PollDelay::linear(Duration::from_secs(2))
//!     .with_max(Duration::from_secs(6))
//!     .with_jitter(Jitter::Absolute(Duration::from_secs(1)));
//!
//! assert!(delay.delay(1) >= Duration::from_secs(1));
//! assert!(delay.delay(1) <= Duration::from_secs(3));
//! // Note the max here is the max plus max jitter
//! assert!(delay.delay(10) >= Duration::from_secs(5));
//! assert!(delay.delay(10) <= Duration::from_secs(7));
//! ```
use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Growth {
    Constant,
    Linear,
    Exponential,
}

/// A random jitter to be applied to a given delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// A random jitter to be added to the delay in the range `-delta =< jitter =< delta`.
    Absolute(Duration),
    /// A random jitter to be added as a proportion of the current delay.
    Relative(f64),
}

impl Jitter {
    /// Works in whole milliseconds, saturating at both ends.
    fn apply_jitter(&self, value: Duration) -> Duration {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        let spread = match self {
            Self::Absolute(delta) => i64::try_from(delta.as_millis()).unwrap_or(i64::MAX),
            Self::Relative(ratio) => (millis as f64 * ratio).round() as i64,
        }
        .saturating_abs();
        let jitter = rand::thread_rng().gen_range(-spread..=spread);
        let millis = if jitter >= 0 {
            millis.saturating_add(jitter.unsigned_abs())
        } else {
            millis.saturating_sub(jitter.unsigned_abs())
        };
        Duration::from_millis(millis)
    }
}

/// How long to wait before the next status fetch of a job.
///
/// `attempt` is the number of fetches already made, so the first call a poll loop makes is
/// `delay(1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollDelay {
    growth: Growth,
    base: Duration,
    max: Option<Duration>,
    jitter: Option<Jitter>,
    min: Duration,
}

impl PollDelay {
    /// Always waits `delay`, no matter what the attempt is.
    ///
    /// ```
    /// # use taskwatch::backoff::PollDelay;
    /// # use std::time::Duration;
    /// let delay = PollDelay::constant(Duration::from_secs(2));
    ///
    /// assert_eq!(delay.delay(1), Duration::from_secs(2));
    /// assert_eq!(delay.delay(100), Duration::from_secs(2));
    /// ```
    pub const fn constant(delay: Duration) -> Self {
        Self::new(Growth::Constant, delay)
    }

    /// Grows linearly with each attempt.
    pub const fn linear(step: Duration) -> Self {
        Self::new(Growth::Linear, step)
    }

    /// Doubles with each attempt, starting at `base`. It is advisable to set a maximum using
    /// [`PollDelay::with_max`].
    ///
    /// ```
    /// # use taskwatch::backoff::PollDelay;
    /// # use std::time::Duration;
    /// let delay = PollDelay::exponential(Duration::from_secs(1)).with_max(Duration::from_secs(10));
    ///
    /// assert_eq!(delay.delay(1), Duration::from_secs(1));
    /// assert_eq!(delay.delay(2), Duration::from_secs(2));
    /// assert_eq!(delay.delay(4), Duration::from_secs(8));
    /// assert_eq!(delay.delay(5), Duration::from_secs(10));
    /// ```
    pub const fn exponential(base: Duration) -> Self {
        Self::new(Growth::Exponential, base)
    }

    const fn new(growth: Growth, base: Duration) -> Self {
        Self {
            growth,
            base,
            max: None,
            jitter: None,
            min: Duration::ZERO,
        }
    }

    /// Clamps the delay before jitter is applied.
    pub const fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    /// Add a jitter to the delay see [`Jitter`] for more information about how this affects the
    /// strategy.
    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Add a minimum value. This can be useful when you have a particularly large jitter and
    /// would like to avoid hammering the backend.
    pub const fn with_min(mut self, min: Duration) -> Self {
        self.min = min;
        self
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let mut delay = match self.growth {
            Growth::Constant => self.base,
            Growth::Linear => self.base.saturating_mul(attempt),
            Growth::Exponential => 2u32
                .checked_pow(attempt - 1)
                .map_or(Duration::MAX, |factor| self.base.saturating_mul(factor)),
        };
        if let Some(max) = self.max {
            delay = delay.min(max);
        }
        if let Some(jitter) = self.jitter {
            delay = jitter.apply_jitter(delay);
        }
        delay.max(self.min)
    }
}

impl Default for PollDelay {
    fn default() -> Self {
        Self::constant(Duration::from_secs(2))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constant_delay() {
        let base = Duration::from_secs(2);
        let delay = PollDelay::constant(base);

        for i in 1..100 {
            assert_eq!(delay.delay(i), base);
        }
    }

    #[test]
    fn constant_delay_with_absolute_jitter() {
        let base = Duration::from_secs(10);
        let jitter = Duration::from_secs(2);
        let delay = PollDelay::constant(base).with_jitter(Jitter::Absolute(jitter));

        for i in 1..100 {
            let value = delay.delay(i);
            assert!(value >= base - jitter);
            assert!(value <= base + jitter);
        }
    }

    #[test]
    fn constant_delay_with_jitter_min() {
        let base = Duration::from_secs(2);
        let min = Duration::from_secs(1);
        let delay = PollDelay::constant(base)
            .with_jitter(Jitter::Relative(1.0))
            .with_min(min);

        for i in 1..100 {
            let value = delay.delay(i);
            assert!(value >= min);
            assert!(value <= base * 2);
        }
    }

    #[test]
    fn linear_delay() {
        let step = Duration::from_secs(1);
        let delay = PollDelay::linear(step);

        for i in 1..100 {
            assert_eq!(delay.delay(i), step * i);
        }
    }

    #[test]
    fn linear_delay_with_max() {
        let max = Duration::from_secs(10);
        let delay = PollDelay::linear(Duration::from_secs(3)).with_max(max);

        assert_eq!(delay.delay(3), Duration::from_secs(9));
        for i in 4..100 {
            assert_eq!(delay.delay(i), max);
        }
    }

    #[test]
    fn linear_delay_with_relative_jitter() {
        let step = Duration::from_secs(10);
        let delay = PollDelay::linear(step).with_jitter(Jitter::Relative(0.1));

        for i in 1..50 {
            let value = delay.delay(i);
            let jitter = Duration::from_secs(1) * i;
            assert!(value >= step * i - jitter);
            assert!(value <= step * i + jitter);
        }
    }

    #[test]
    fn exponential_delay_saturates() {
        let max = Duration::from_secs(60);
        let delay = PollDelay::exponential(Duration::from_millis(500)).with_max(max);

        assert_eq!(delay.delay(1), Duration::from_millis(500));
        assert_eq!(delay.delay(3), Duration::from_secs(2));
        for i in 9..200 {
            assert_eq!(delay.delay(i), max);
        }
    }

    #[test]
    fn jitter_on_saturated_delay_stays_large() {
        let jitter = Duration::from_secs(1);
        let delay = PollDelay::exponential(Duration::from_secs(1)).with_jitter(Jitter::Absolute(jitter));

        let expected = Duration::from_secs(1 << 39);
        for _ in 0..20 {
            let value = delay.delay(40);
            assert!(value >= expected - jitter);
            assert!(value <= expected + jitter);
            assert!(delay.delay(200) >= Duration::from_secs(1 << 40));
        }

        let relative = PollDelay::exponential(Duration::from_secs(1)).with_jitter(Jitter::Relative(0.5));
        assert!(relative.delay(200) >= Duration::from_secs(1 << 40));
    }

    #[test]
    fn attempt_zero_is_treated_as_first() {
        let delay = PollDelay::linear(Duration::from_secs(1));
        assert_eq!(delay.delay(0), delay.delay(1));
    }
}
