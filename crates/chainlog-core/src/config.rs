//! Broadcaster configuration and resubscribe backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a log broadcaster instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcasterConfig {
    /// Chain label, used in log output.
    #[serde(default = "default_chain")]
    pub chain: String,
    /// Delay before the first retry of a failed resubscribe cycle.
    #[serde(default = "default_initial_backoff_ms")]
    pub resubscribe_initial_backoff_ms: u64,
    /// Upper bound on the retry delay.
    #[serde(default = "default_max_backoff_ms")]
    pub resubscribe_max_backoff_ms: u64,
    /// Growth factor applied per consecutive failure.
    #[serde(default = "default_multiplier")]
    pub resubscribe_backoff_multiplier: f64,
    /// Quiet period after a watched-set change before resubscribing, so a
    /// burst of registrations shares one subscription.
    #[serde(default = "default_debounce_ms")]
    pub resubscribe_debounce_ms: u64,
}

fn default_chain() -> String {
    "ethereum".into()
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_debounce_ms() -> u64 {
    50
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            chain: default_chain(),
            resubscribe_initial_backoff_ms: default_initial_backoff_ms(),
            resubscribe_max_backoff_ms: default_max_backoff_ms(),
            resubscribe_backoff_multiplier: default_multiplier(),
            resubscribe_debounce_ms: default_debounce_ms(),
        }
    }
}

impl BroadcasterConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_millis(self.resubscribe_initial_backoff_ms),
            max: Duration::from_millis(self.resubscribe_max_backoff_ms),
            multiplier: self.resubscribe_backoff_multiplier,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.resubscribe_debounce_ms)
    }
}

/// Capped exponential backoff with no retry limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Backoff {
    /// Delay before the `attempt`-th retry (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = base_ms.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}
