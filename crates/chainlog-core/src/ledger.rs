//! Consumption ledger contract and in-memory implementation.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::types::{ConsumerId, LogIdentity};

/// Persistent record of which (log, consumer) pairs were consumed.
///
/// Must survive process restarts in production; see the SQLite backend in
/// `chainlog-storage`.
#[async_trait]
pub trait ConsumptionLedger: Send + Sync {
    async fn was_consumed(
        &self,
        log: &LogIdentity,
        consumer: &ConsumerId,
    ) -> Result<bool, LedgerError>;

    /// Record consumption. Marking an already-consumed pair is a no-op.
    async fn mark_consumed(&self, log: &LogIdentity, consumer: &ConsumerId)
        -> Result<(), LedgerError>;

    /// Number of recorded (log, consumer) pairs.
    async fn count(&self) -> Result<u64, LedgerError>;
}

/// In-memory ledger (for testing and development).
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashSet<(LogIdentity, ConsumerId)>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsumptionLedger for MemoryLedger {
    async fn was_consumed(
        &self,
        log: &LogIdentity,
        consumer: &ConsumerId,
    ) -> Result<bool, LedgerError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.contains(&(*log, consumer.clone())))
    }

    async fn mark_consumed(
        &self,
        log: &LogIdentity,
        consumer: &ConsumerId,
    ) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert((*log, consumer.clone()));
        Ok(())
    }

    async fn count(&self) -> Result<u64, LedgerError> {
        Ok(self.entries.lock().unwrap().len() as u64)
    }
}
