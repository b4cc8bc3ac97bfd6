use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Exponential reconnect delay: doubles from `base` up to `ceiling`, and
/// starts over from `base` after a successful connection.
///
/// With jitter enabled each delay is stretched by up to a tenth of itself,
/// still capped at the ceiling, so the sequence stays non-decreasing.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    jitter: bool,
    next: Duration,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let base = Duration::from_millis(config.base_ms);
        Self {
            base,
            ceiling: Duration::from_millis(config.ceiling_ms),
            jitter: config.jitter,
            next: base,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.ceiling);

        if !self.jitter {
            return delay;
        }
        let spread = delay.as_millis() as u64 / 10;
        let extra = rand::thread_rng().gen_range(0..=spread);
        (delay + Duration::from_millis(extra)).min(self.ceiling)
    }

    pub fn reset(&mut self) {
        self.next = self.base;
    }
}
