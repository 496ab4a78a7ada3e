//! Fluent builder API for creating log broadcasters.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use chainlog_core::{ChainClient, MemoryLedger};
//! use chainlog_broadcaster::BroadcasterBuilder;
//!
//! # fn example(client: Arc<dyn ChainClient>) {
//! let broadcaster = BroadcasterBuilder::new()
//!     .chain("sepolia")
//!     .resubscribe_backoff_ms(500, 60_000)
//!     .dependents(2)
//!     .build(client, Arc::new(MemoryLedger::new()));
//! broadcaster.start();
//! # }
//! ```

use std::sync::Arc;

use chainlog_core::{BroadcasterConfig, ChainClient, ConsumptionLedger};

use crate::broadcaster::LogBroadcaster;

/// Fluent builder for [`LogBroadcaster`].
#[derive(Default)]
pub struct BroadcasterBuilder {
    config: BroadcasterConfig,
    dependents: u32,
}

impl BroadcasterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn with_config(mut self, config: BroadcasterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the chain label used in log output.
    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    /// Set the initial and maximum resubscribe retry delay.
    pub fn resubscribe_backoff_ms(mut self, initial: u64, max: u64) -> Self {
        self.config.resubscribe_initial_backoff_ms = initial;
        self.config.resubscribe_max_backoff_ms = max;
        self
    }

    /// Set the quiet period between a watched-set change and the resubscribe.
    pub fn resubscribe_debounce_ms(mut self, ms: u64) -> Self {
        self.config.resubscribe_debounce_ms = ms;
        self
    }

    /// Set the retry delay growth factor.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.resubscribe_backoff_multiplier = multiplier;
        self
    }

    /// Arm the dependent countdown before the broadcaster is shared.
    pub fn dependents(mut self, n: u32) -> Self {
        self.dependents = n;
        self
    }

    /// Build the `BroadcasterConfig`.
    pub fn build_config(self) -> BroadcasterConfig {
        self.config
    }

    /// Build a broadcaster over the given collaborators. Not started.
    pub fn build(
        self,
        client: Arc<dyn ChainClient>,
        ledger: Arc<dyn ConsumptionLedger>,
    ) -> LogBroadcaster {
        let broadcaster = LogBroadcaster::new(client, ledger, self.config);
        if self.dependents > 0 {
            broadcaster.add_dependents(self.dependents);
        }
        broadcaster
    }
}
