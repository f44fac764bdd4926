//! Configuration types for the session client, validator, and monitor

use std::time::Duration;

use crate::error::AuthError;

/// Session client configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the session API (e.g., https://app.ensina.dev)
    pub base_url: String,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout; a hit surfaces as a network error
    pub request_timeout: Duration,
    /// How long a fetched user stays fresh
    pub session_ttl: Duration,
    /// Quiet window after a session check during which new checks reuse the cache
    pub check_debounce: Duration,
    /// Coalescing window for subscriber notifications
    pub notify_debounce: Duration,
    /// Consecutive failures before the breaker opens
    pub breaker_threshold: u32,
    /// How long the breaker stays open before a half-open probe
    pub breaker_cooldown: Duration,
}

impl SessionConfig {
    /// Create a session config for the given API base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            session_ttl: Duration::from_secs(5 * 60), // 5 minutes
            check_debounce: Duration::from_secs(5),
            notify_debounce: Duration::from_millis(100),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
        }
    }

    /// Set the TCP connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the whole-request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the cache TTL for the fetched user
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set the session-check debounce window
    #[must_use]
    pub fn with_check_debounce(mut self, window: Duration) -> Self {
        self.check_debounce = window;
        self
    }

    /// Set the subscriber-notification coalescing window
    #[must_use]
    pub fn with_notify_debounce(mut self, window: Duration) -> Self {
        self.notify_debounce = window;
        self
    }

    /// Set the breaker failure threshold
    #[must_use]
    pub fn with_breaker_threshold(mut self, threshold: u32) -> Self {
        self.breaker_threshold = threshold;
        self
    }

    /// Set the breaker cooldown
    #[must_use]
    pub fn with_breaker_cooldown(mut self, cooldown: Duration) -> Self {
        self.breaker_cooldown = cooldown;
        self
    }

    /// Check the config for values that cannot work at runtime
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.base_url.trim().is_empty() {
            return Err(AuthError::Config("base_url must not be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(AuthError::Config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.breaker_threshold == 0 {
            return Err(AuthError::Config(
                "breaker_threshold must be at least 1".to_string(),
            ));
        }
        if self.session_ttl.is_zero() {
            return Err(AuthError::Config(
                "session_ttl must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Consistency validator configuration
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Attempt automatic correction after an inconsistent validation
    pub auto_fix: bool,
    /// Maximum number of retained reports
    pub history_capacity: usize,
    /// Retry policy for correction execution
    pub retry: crate::retry::RetryConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            auto_fix: true,
            history_capacity: 50,
            retry: crate::retry::RetryConfig::default(),
        }
    }
}

impl ValidatorConfig {
    /// Create a validator config with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable automatic correction
    #[must_use]
    pub fn with_auto_fix(mut self, auto_fix: bool) -> Self {
        self.auto_fix = auto_fix;
        self
    }

    /// Set the report history capacity
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the correction retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: crate::retry::RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Check the config for values that cannot work at runtime
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.history_capacity == 0 {
            return Err(AuthError::Config(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AuthError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Health monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between consistency cycles
    pub interval: Duration,
    /// Consecutive inconsistent cycles tolerated before escalation
    pub max_consecutive_inconsistencies: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_consecutive_inconsistencies: 3,
        }
    }
}

impl MonitorConfig {
    /// Create a monitor config with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cycle interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the escalation threshold
    #[must_use]
    pub fn with_max_consecutive_inconsistencies(mut self, max: u32) -> Self {
        self.max_consecutive_inconsistencies = max;
        self
    }

    /// Check the config for values that cannot work at runtime
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.interval.is_zero() {
            return Err(AuthError::Config("interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::new("https://app.ensina.dev");
        assert_eq!(config.session_ttl, Duration::from_secs(300));
        assert_eq!(config.check_debounce, Duration::from_secs(5));
        assert_eq!(config.notify_debounce, Duration::from_millis(100));
        assert_eq!(config.breaker_threshold, 5);
        assert_eq!(config.breaker_cooldown, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_builders() {
        let config = SessionConfig::new("http://localhost:3000")
            .with_session_ttl(Duration::from_secs(60))
            .with_check_debounce(Duration::ZERO)
            .with_breaker_threshold(2);
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(config.check_debounce, Duration::ZERO);
        assert_eq!(config.breaker_threshold, 2);
    }

    #[test]
    fn test_session_validation_rejects_bad_values() {
        assert!(SessionConfig::new("").validate().is_err());
        assert!(SessionConfig::new("ftp://app.ensina.dev").validate().is_err());
        assert!(SessionConfig::new("https://app.ensina.dev")
            .with_breaker_threshold(0)
            .validate()
            .is_err());
        assert!(SessionConfig::new("https://app.ensina.dev")
            .with_session_ttl(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validator_defaults_and_validation() {
        let config = ValidatorConfig::default();
        assert!(config.auto_fix);
        assert_eq!(config.history_capacity, 50);
        assert!(config.validate().is_ok());

        assert!(ValidatorConfig::new()
            .with_history_capacity(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_monitor_defaults_and_validation() {
        let config = MonitorConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.max_consecutive_inconsistencies, 3);
        assert!(config.validate().is_ok());

        assert!(MonitorConfig::new()
            .with_interval(Duration::ZERO)
            .validate()
            .is_err());
    }
}
