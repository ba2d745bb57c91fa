//! Client configuration.

use std::time::Duration;

use crate::backoff::ReconnectPolicy;
use crate::error::Error;

/// Default capacity of each listener queue.
pub const DEFAULT_LISTENER_QUEUE_CAPACITY: usize = 64;

/// Default timeout for opening an upstream.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Notifications buffered per listener before new ones are dropped.
    pub listener_queue_capacity: usize,

    /// Timeout for a single upstream open.
    pub open_timeout: Duration,

    /// Backoff between reconnect attempts.
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            listener_queue_capacity: DEFAULT_LISTENER_QUEUE_CAPACITY,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Set the listener queue capacity.
    pub fn with_listener_queue_capacity(mut self, capacity: usize) -> Self {
        self.listener_queue_capacity = capacity;
        self
    }

    /// Set the upstream open timeout.
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if self.listener_queue_capacity == 0 {
            return Err(Error::Config(
                "listener queue capacity must be at least 1".to_string(),
            ));
        }
        if self.open_timeout.is_zero() {
            return Err(Error::Config("open timeout must be non-zero".to_string()));
        }
        self.reconnect.validate().map_err(Error::Config)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.listener_queue_capacity, DEFAULT_LISTENER_QUEUE_CAPACITY);
        assert_eq!(config.open_timeout, DEFAULT_OPEN_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new()
            .with_listener_queue_capacity(8)
            .with_open_timeout(Duration::from_secs(1))
            .with_reconnect(ReconnectPolicy::default().with_max_attempts(2));

        assert_eq!(config.listener_queue_capacity, 8);
        assert_eq!(config.reconnect.max_attempts, Some(2));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = ClientConfig::new().with_listener_queue_capacity(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
