//! Retry policy for failed invocations.
//!
//! Retries happen immediately inside the same trigger, after a fixed delay.
//! They never apply to errors that are not refirable (see
//! [`TaskError::is_refirable`]).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::task::TaskError;

/// How a failed invocation is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (0 = no retries).
    pub max_attempts: u32,

    /// Fixed delay between attempts.
    #[serde(with = "duration_millis")]
    pub delay: Duration,

    /// Which errors are retried.
    pub retry_on: RetryCondition,
}

/// Conditions under which a failed invocation is retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryCondition {
    /// Any refirable error.
    #[default]
    Always,

    /// Only transient I/O errors.
    TransientOnly,

    /// Never retry, regardless of max_attempts.
    Never,
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            delay: Duration::ZERO,
            retry_on: RetryCondition::Never,
        }
    }

    /// Retry up to `max_attempts` times with a fixed delay.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            retry_on: RetryCondition::Always,
        }
    }

    /// Builder: set the retry condition.
    pub fn with_condition(mut self, condition: RetryCondition) -> Self {
        self.retry_on = condition;
        self
    }

    /// Check if retries are enabled.
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0 && self.retry_on != RetryCondition::Never
    }

    /// Decide whether to run again after `error`, given the number of
    /// attempts already made (the initial attempt counts as 1).
    pub fn should_retry(&self, error: &TaskError, attempts: u32) -> bool {
        if !self.is_enabled() || !error.is_refirable() || attempts > self.max_attempts {
            return false;
        }
        match self.retry_on {
            RetryCondition::Always => true,
            RetryCondition::TransientOnly => error.is_transient(),
            RetryCondition::Never => false,
        }
    }
}

impl Default for RetryPolicy {
    /// Default policy: no retries.
    fn default() -> Self {
        Self::none()
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
