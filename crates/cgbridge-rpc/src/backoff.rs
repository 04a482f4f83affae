//! Exponential reconnection backoff with randomized jitter.

use std::time::Duration;

const FACTOR: f64 = 2.0;

/// Past this many doublings every delay is capped at `max` anyway
const MAX_EXPONENT: u32 = 32;

/// Delay generator for reconnection attempts.
///
/// The n-th delay is `min * 2^n`, shifted up or down by a random deviation of
/// at most `jitter * delay`, and capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    jitter: f64,
    attempts: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(min: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            min,
            max,
            jitter: jitter.clamp(0.0, 1.0),
            attempts: 0,
        }
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Delay before the next attempt; increments the attempt counter.
    pub fn duration(&mut self) -> Duration {
        let exponent = self.attempts.min(MAX_EXPONENT).cast_signed();
        self.attempts = self.attempts.saturating_add(1);

        let mut ms = self.min.as_secs_f64() * 1000.0 * FACTOR.powi(exponent);

        if self.jitter > 0.0 {
            let rand: f64 = rand::random();
            let deviation = (rand * self.jitter * ms).floor();
            // rand is in [0, 1), so the tenth digit fits in u32
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let tenth = (rand * 10.0).floor() as u32;
            ms = if tenth % 2 == 0 {
                ms - deviation
            } else {
                ms + deviation
            };
        }

        let max_ms = self.max.as_secs_f64() * 1000.0;
        if !ms.is_finite() {
            return self.max;
        }
        Duration::try_from_secs_f64(ms.clamp(0.0, max_ms) / 1000.0).unwrap_or(self.max)
    }
}
