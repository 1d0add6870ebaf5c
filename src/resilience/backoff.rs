//! Exponential backoff with jitter for bounded selection retries.

use std::time::Duration;

use rand::Rng;

use crate::config::ReadConfig;

/// Bounded retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one immediate.
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max,
        }
    }

    /// Delay to wait before `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base.as_millis() as u64, self.max.as_millis() as u64)
    }

    /// Upper bound on the time spent sleeping across all attempts.
    ///
    /// Uses the same millisecond arithmetic as [`calculate_backoff`], with
    /// the jitter at its maximum.
    pub fn worst_case(&self) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let total_ms = (1..self.max_attempts)
            .map(|attempt| {
                let capped = base_ms
                    .saturating_mul(2u64.saturating_pow(attempt - 1))
                    .min(max_ms);
                capped + (capped / 10).saturating_sub(1)
            })
            .fold(0u64, u64::saturating_add);
        Duration::from_millis(total_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ReadConfig::default())
    }
}

impl From<&ReadConfig> for RetryPolicy {
    fn from(config: &ReadConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Jitter: 0 to 10% of the delay
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_is_immediate() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::ZERO);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000 && max.as_millis() < 1100);
    }

    #[test]
    fn test_default_schedule_is_short() {
        // 5 + 10 + 20 ms plus jitter
        assert!(RetryPolicy::default().worst_case() < Duration::from_millis(100));
    }

    #[test]
    fn test_worst_case_bounds_every_delay_past_u32_range() {
        // 2^40 overflows u32 but not u64; both paths must saturate to the cap.
        let policy = RetryPolicy::new(48, Duration::from_millis(3), Duration::from_secs(3600));
        let slept: Duration = (1..policy.max_attempts).map(|a| policy.delay(a)).sum();
        assert!(slept <= policy.worst_case());

        let capped = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(150));
        // 100 + 9, then 150 + 14
        assert_eq!(capped.worst_case(), Duration::from_millis(273));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(policy.max_attempts, 1);
    }
}
