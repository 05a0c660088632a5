//! Wait configuration for SMS code polling.

use crate::errors::{Result, VakSmsError};
use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use std::time::Duration;

/// Spacing between poll attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStrategy {
    /// Same delay before every attempt.
    Fixed(Duration),
    /// Delay starts at `initial` and grows by `factor` up to `max`.
    Exponential {
        initial: Duration,
        factor: f32,
        max: Duration,
    },
}

impl Default for PollStrategy {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(5))
    }
}

impl PollStrategy {
    /// Endless sequence of delays, one per poll attempt.
    pub(crate) fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        match *self {
            Self::Fixed(delay) => Box::new(
                ConstantBuilder::default()
                    .with_delay(delay)
                    .with_max_times(usize::MAX)
                    .build(),
            ),
            Self::Exponential {
                initial,
                factor,
                max,
            } => Box::new(
                ExponentialBuilder::default()
                    .with_min_delay(initial)
                    .with_max_delay(max)
                    .with_factor(factor)
                    .with_max_times(usize::MAX)
                    .build(),
            ),
        }
    }

    /// Delay before the first attempt.
    pub fn first_delay(&self) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial, .. } => *initial,
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| -> Result<()> {
            Err(VakSmsError::InvalidWaitConfig {
                reason: reason.to_string(),
            })
        };

        match self {
            Self::Fixed(delay) if delay.is_zero() => invalid("poll interval must be positive"),
            Self::Exponential { initial, .. } if initial.is_zero() => {
                invalid("initial poll interval must be positive")
            }
            Self::Exponential { factor, .. } if !(factor.is_finite() && *factor >= 1.0) => {
                invalid("backoff factor must be a finite number >= 1.0")
            }
            Self::Exponential { initial, max, .. } if max < initial => {
                invalid("maximum poll interval must not be below the initial one")
            }
            _ => Ok(()),
        }
    }
}

/// Configuration for waiting on an SMS code.
///
/// Polling stops once `timeout` has elapsed; the last sleep is shortened so
/// that no attempt is made after the deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitConfig {
    /// Maximum time to wait for the code.
    pub timeout: Duration,
    /// Spacing between attempts.
    pub strategy: PollStrategy,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

impl WaitConfig {
    /// Create a new builder for WaitConfig.
    ///
    /// # Example
    ///
    /// ```rust
    /// use vak_sms::WaitConfig;
    /// use std::time::Duration;
    ///
    /// let config = WaitConfig::builder()
    ///     .timeout(Duration::from_secs(180))
    ///     .poll_interval(Duration::from_secs(3))
    ///     .build();
    ///
    /// assert_eq!(config.timeout, Duration::from_secs(180));
    /// ```
    pub fn builder() -> WaitConfigBuilder {
        WaitConfigBuilder::default()
    }

    /// One minute, polling every 2 seconds.
    pub fn fast() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            strategy: PollStrategy::Fixed(Duration::from_secs(2)),
        }
    }

    /// Five minutes, polling every 5 seconds (default).
    pub fn balanced() -> Self {
        Self {
            timeout: Duration::from_secs(5 * 60),
            strategy: PollStrategy::default(),
        }
    }

    /// Ten minutes, polling from every 5 seconds up to every 30 seconds.
    pub fn patient() -> Self {
        Self {
            timeout: Duration::from_secs(10 * 60),
            strategy: PollStrategy::Exponential {
                initial: Duration::from_secs(5),
                factor: 1.5,
                max: Duration::from_secs(30),
            },
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a fixed poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.strategy = PollStrategy::Fixed(interval);
        self
    }

    pub fn with_strategy(mut self, strategy: PollStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Check that the configuration can drive a polling loop.
    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()
    }
}

/// Builder for WaitConfig.
#[derive(Debug, Clone, Default)]
pub struct WaitConfigBuilder {
    config: WaitConfig,
}

impl WaitConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum wait.
    ///
    /// Default: 5 minutes
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set a fixed interval between attempts.
    ///
    /// Default: 5 seconds
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.strategy = PollStrategy::Fixed(interval);
        self
    }

    pub fn strategy(mut self, strategy: PollStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn build(self) -> WaitConfig {
        self.config
    }

    /// Build and validate.
    pub fn try_build(self) -> Result<WaitConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
