//! Outbound request spacing.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token-interval gate: callers are spaced at least `1 / rate` apart.
#[derive(Debug)]
pub struct RateGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    /// Create a gate allowing `requests_per_second` calls per second.
    pub fn new(requests_per_second: u32) -> Self {
        let min_interval = Duration::from_secs(1) / requests_per_second.max(1);
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Minimum spacing between two calls.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next call is allowed, then claim the slot.
    ///
    /// The lock is held across the sleep so concurrent callers queue up.
    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_from_rate() {
        assert_eq!(RateGate::new(10).min_interval(), Duration::from_millis(100));
        assert_eq!(RateGate::new(0).min_interval(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate() {
        let gate = RateGate::new(10);
        let start = Instant::now();
        gate.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_are_spaced() {
        let gate = RateGate::new(10);
        let start = Instant::now();
        for _ in 0..4 {
            gate.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
