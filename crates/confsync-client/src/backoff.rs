//! Reconnect backoff policy.

use std::time::Duration;

use rand::Rng;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Default upper bound on a single reconnect delay.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Exponential, capped backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before attempt 1.
    pub base: Duration,
    /// Growth factor per attempt.
    pub factor: f64,
    /// Maximum delay.
    pub cap: Duration,
    /// Relative jitter in `[0, 1)`; 0.2 spreads delays by ±20%.
    pub jitter: f64,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Create a policy with the given base delay and cap.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            factor: 2.0,
            cap,
            jitter: 0.2,
            max_attempts: None,
        }
    }

    /// Set the growth factor.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Set the jitter.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Disable jitter.
    pub fn without_jitter(self) -> Self {
        self.with_jitter(0.0)
    }

    /// Give up after `attempts` consecutive failures.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Check whether attempt number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Delay before attempt number `attempt` (1-based). Attempt 0 has no delay.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let cap = self.cap.as_secs_f64();
        let exp = self.factor.max(1.0).powi(attempt.saturating_sub(1).min(64) as i32);
        let mut delay = (self.base.as_secs_f64() * exp).min(cap);

        if self.jitter > 0.0 {
            let jitter = self.jitter.min(0.99);
            let spread = rand::thread_rng().gen_range(-jitter..jitter);
            delay = (delay * (1.0 + spread)).min(cap);
        }

        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Check the policy parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.factor < 1.0 || !self.factor.is_finite() {
            return Err(format!("backoff factor must be >= 1, got {}", self.factor));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(format!("backoff jitter must be in [0, 1), got {}", self.jitter));
        }
        if self.base > self.cap {
            return Err("backoff base must not exceed the cap".to_string());
        }
        Ok(())
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_is_capped() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(1))
            .without_jitter();

        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
        assert_eq!(policy.delay(5), Duration::from_secs(1));
        assert_eq!(policy.delay(500), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_jitter(0.5);

        for _ in 0..100 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_max_attempts() {
        let policy = ReconnectPolicy::default().with_max_attempts(3);
        assert!(policy.allows(3));
        assert!(!policy.allows(4));
        assert!(ReconnectPolicy::default().allows(u32::MAX));
    }

    #[test]
    fn test_validate() {
        assert!(ReconnectPolicy::default().validate().is_ok());
        assert!(ReconnectPolicy::default().with_factor(0.5).validate().is_err());
        assert!(ReconnectPolicy::default().with_jitter(1.5).validate().is_err());
        assert!(ReconnectPolicy::new(Duration::from_secs(5), Duration::from_secs(1))
            .validate()
            .is_err());
    }
}
