// ── Reconnect policy ─────────────────────────────────────────────────
//
// One policy for every push-stream connection: bounded attempts,
// exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Jitter bounds applied to every computed delay.
const JITTER: std::ops::RangeInclusive<f64> = 0.75..=1.25;

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 2s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up. Default: 3.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnection attempt number `attempt` (0-based).
    ///
    /// `delay = min(initial * 2^attempt, max) * jitter`, with the jitter
    /// factor drawn from [0.75, 1.25] on every call so that many clients
    /// dropped at once do not reconnect in lockstep. A config whose cap
    /// equals its initial delay is a fixed delay and gets no jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.is_fixed() {
            return base;
        }
        let factor = rand::thread_rng().gen_range(JITTER);
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }

    /// The un-jittered delay: `min(initial * 2^attempt, max)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.min(31)).unwrap_or(31);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exp);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }

    fn is_fixed(&self) -> bool {
        self.max_delay <= self.initial_delay
    }

    /// Whether another attempt is allowed after `attempts_made` retries.
    pub fn allows(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(2));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn base_delay_doubles_up_to_the_cap() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay(0), Duration::from_secs(2));
        assert_eq!(config.base_delay(1), Duration::from_secs(4));
        assert_eq!(config.base_delay(2), Duration::from_secs(8));
        assert_eq!(config.base_delay(4), Duration::from_secs(30));
        assert_eq!(config.base_delay(40), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_a_quarter_of_the_base() {
        let config = ReconnectConfig::default();
        for attempt in 0..6 {
            let base = config.base_delay(attempt).as_secs_f64();
            for _ in 0..200 {
                let d = config.delay_for(attempt).as_secs_f64();
                assert!(
                    d >= base * 0.75 - 1e-9 && d <= base * 1.25 + 1e-9,
                    "attempt {attempt}: {d}s outside [{}, {}]",
                    base * 0.75,
                    base * 1.25
                );
            }
        }
    }

    #[test]
    fn independent_clients_do_not_share_a_schedule() {
        let client_a = ReconnectConfig::default();
        let client_b = ReconnectConfig::default();

        let a: Vec<Duration> = (0..8).map(|n| client_a.delay_for(n % 3)).collect();
        let b: Vec<Duration> = (0..8).map(|n| client_b.delay_for(n % 3)).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn equal_cap_and_initial_is_a_fixed_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(2),
            max_retries: 5,
        };
        for attempt in 0..5 {
            assert_eq!(config.delay_for(attempt), Duration::from_secs(2));
        }
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: 50,
        };

        for attempt in [10, 31, 40] {
            let d = config.delay_for(attempt);
            assert!(
                d <= Duration::from_millis(12_500),
                "delay at attempt {attempt} ({d:?}) should be capped near max_delay"
            );
        }
    }

    #[test]
    fn allows_stops_at_max_retries() {
        let config = ReconnectConfig::default();
        assert!(config.allows(0));
        assert!(config.allows(2));
        assert!(!config.allows(3));
        assert!(!config.allows(4));
    }
}
