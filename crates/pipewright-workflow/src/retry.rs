use std::time::Duration;

use pipewright_config::RetryBackoff;
use serde::{Deserialize, Serialize};

/// Upper bound for `max_retry_attempts`.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Upper bound for a single backoff delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Retry policy applied to failing command steps.
///
/// `max_attempts` counts the first attempt, so the default of 1 means no
/// retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff: RetryBackoff,
  pub initial_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 1,
      backoff: RetryBackoff::Exponential,
      initial_delay: Duration::from_millis(1000),
    }
  }
}

impl RetryPolicy {
  /// Layer partial settings over this policy. Set fields win.
  pub fn apply(&self, settings: &RetrySettings) -> Self {
    Self {
      max_attempts: settings
        .max_attempts
        .unwrap_or(self.max_attempts)
        .clamp(1, MAX_RETRY_ATTEMPTS),
      backoff: settings.backoff.unwrap_or(self.backoff),
      initial_delay: settings
        .initial_delay_ms
        .map(Duration::from_millis)
        .unwrap_or(self.initial_delay),
    }
  }

  /// Delay before the next attempt after `failed_attempts` failures.
  pub fn delay_for(&self, failed_attempts: u32) -> Duration {
    let n = failed_attempts.max(1);
    let delay = match self.backoff {
      RetryBackoff::Constant => self.initial_delay,
      RetryBackoff::Linear => self.initial_delay.saturating_mul(n),
      RetryBackoff::Exponential => {
        let factor = 2u32.checked_pow(n - 1).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
      }
    };
    delay.min(MAX_RETRY_DELAY)
  }
}

/// Partially specified retry settings, as written on a workflow or step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
  pub max_attempts: Option<u32>,
  pub backoff: Option<RetryBackoff>,
  pub initial_delay_ms: Option<u64>,
}
