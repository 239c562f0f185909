use std::time::Duration;

use crate::config::BackoffConfig;

/// Exponential backoff state for reconnecting the fragment stream.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Reconnects scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn retries(&self) -> u32 {
        self.config.retries
    }

    /// Called after a stream that ended cleanly.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next reconnect, or `None` once retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.retries {
            return None;
        }
        let delay = self.delay_for(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    /// `min * factor^attempt`, capped at `max`, then spread by ± jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp_delay = self.config.min as f64 * self.config.factor.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = exp_delay.min(self.config.max as f64);

        let jitter_range = capped * self.config.jitter;
        let jitter = if jitter_range >= 1.0 {
            (random_u64() % (jitter_range as u64).saturating_mul(2).saturating_add(1)) as f64 - jitter_range
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

fn random_u64() -> u64 {
    use std::cell::Cell;
    use std::time::SystemTime;

    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1
        );
    }

    STATE.with(|s| {
        // xorshift64
        let mut x = s.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        s.set(x);
        x
    })
}
