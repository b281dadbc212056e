//! Configuration for the happy-eyeballs scheduler

use std::time::Duration;

/// Default delay between staggered attempt starts
///
/// Matches the "Connection Attempt Delay" recommended by RFC 8305.
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(250);

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration for [`race_happy_eyes`](crate::abort::race_happy_eyes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HappyEyesConfig {
    /// How long to wait on the latest attempt before starting the next one
    pub stagger: Duration,
}

impl HappyEyesConfig {
    /// Create a configuration with the given stagger delay
    pub const fn new(stagger: Duration) -> Self {
        Self { stagger }
    }

    /// Create a configuration from a stagger delay in milliseconds
    pub const fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Set the stagger delay
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }
}

impl Default for HappyEyesConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STAGGER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stagger() {
        assert_eq!(HappyEyesConfig::default().stagger, Duration::from_millis(250));
    }

    #[test]
    fn test_builders() {
        let config = HappyEyesConfig::from_millis(50);
        assert_eq!(config.stagger, Duration::from_millis(50));
        let config = config.with_stagger(Duration::from_secs(1));
        assert_eq!(config.stagger, Duration::from_secs(1));
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }
}
