//! The per-delivery handle a listener receives.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::ledger::ConsumptionLedger;
use crate::types::{BroadcastLog, ConsumerId, LogIdentity};

/// One log delivered to one listener, bound to that listener's consumption key.
#[async_trait]
pub trait LogBroadcast: Send + Sync {
    /// The log, raw or decoded.
    fn log(&self) -> &BroadcastLog;

    /// Replace the held log. Used by decoding listeners before forwarding.
    fn update_log(&mut self, log: BroadcastLog);

    /// Whether this (log, consumer) pair was already recorded as consumed.
    async fn was_already_consumed(&self) -> Result<bool, LedgerError>;

    /// Record this (log, consumer) pair as consumed. Idempotent.
    async fn mark_consumed(&self) -> Result<(), LedgerError>;
}

/// [`LogBroadcast`] backed by a [`ConsumptionLedger`].
///
/// The consumption key is fixed at construction from the raw log; replacing
/// the log with a decoded form does not change it.
pub struct ConsumptionBroadcast {
    log: BroadcastLog,
    identity: LogIdentity,
    consumer: ConsumerId,
    ledger: Arc<dyn ConsumptionLedger>,
}

impl ConsumptionBroadcast {
    pub fn new(log: BroadcastLog, consumer: ConsumerId, ledger: Arc<dyn ConsumptionLedger>) -> Self {
        let identity = log.identity();
        Self {
            log,
            identity,
            consumer,
            ledger,
        }
    }

    pub fn consumer(&self) -> &ConsumerId {
        &self.consumer
    }

    pub fn identity(&self) -> &LogIdentity {
        &self.identity
    }
}

#[async_trait]
impl LogBroadcast for ConsumptionBroadcast {
    fn log(&self) -> &BroadcastLog {
        &self.log
    }

    fn update_log(&mut self, log: BroadcastLog) {
        self.log = log;
    }

    async fn was_already_consumed(&self) -> Result<bool, LedgerError> {
        self.ledger.was_consumed(&self.identity, &self.consumer).await
    }

    async fn mark_consumed(&self) -> Result<(), LedgerError> {
        self.ledger.mark_consumed(&self.identity, &self.consumer).await
    }
}
