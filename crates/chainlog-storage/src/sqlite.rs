//! SQLite consumption ledger.
//!
//! One row per (log identity, consumer). Uses `sqlx` with WAL mode so
//! `was_consumed` readers never block `mark_consumed` writers.
//!
//! # Usage
//! ```rust,no_run
//! use chainlog_storage::sqlite::SqliteLedger;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (survives restarts)
//! let ledger = SqliteLedger::open("./consumptions.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let ledger = SqliteLedger::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainlog_core::error::LedgerError;
use chainlog_core::ledger::ConsumptionLedger;
use chainlog_core::types::{ConsumerId, ConsumerKind, LogIdentity};

/// SQLite-backed [`ConsumptionLedger`].
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./consumptions.db"`) or a full
    /// SQLite URL (`"sqlite:./consumptions.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, LedgerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Limited to one connection, since every `:memory:` connection is a
    /// separate database. All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, LedgerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    async fn init_schema(&self) -> Result<(), LedgerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS log_consumptions (
                block_hash    TEXT    NOT NULL,
                tx_index      INTEGER NOT NULL,
                log_index     INTEGER NOT NULL,
                consumer_kind TEXT    NOT NULL,
                consumer_id   TEXT    NOT NULL,
                created_at    INTEGER NOT NULL,
                PRIMARY KEY (block_hash, tx_index, log_index, consumer_kind, consumer_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Delete records older than `cutoff` (unix seconds). Returns rows removed.
    pub async fn prune_before(&self, cutoff: i64) -> Result<u64, LedgerError> {
        let result = sqlx::query("DELETE FROM log_consumptions WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        debug!(cutoff, removed = result.rows_affected(), "pruned consumption records");
        Ok(result.rows_affected())
    }

    /// Close the pool, waiting for connections to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn storage_err(e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn kind_str(kind: ConsumerKind) -> &'static str {
    match kind {
        ConsumerKind::Job => "job",
        ConsumerKind::Initiator => "initiator",
    }
}

// ─── ConsumptionLedger impl ──────────────────────────────────────────────────

#[async_trait]
impl ConsumptionLedger for SqliteLedger {
    async fn was_consumed(
        &self,
        log: &LogIdentity,
        consumer: &ConsumerId,
    ) -> Result<bool, LedgerError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM log_consumptions
             WHERE block_hash = ? AND tx_index = ? AND log_index = ?
               AND consumer_kind = ? AND consumer_id = ?",
        )
        .bind(log.block_hash.to_string())
        .bind(log.tx_index as i64)
        .bind(log.log_index as i64)
        .bind(kind_str(consumer.kind))
        .bind(&consumer.id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.get::<i64, _>("cnt") > 0)
    }

    async fn mark_consumed(
        &self,
        log: &LogIdentity,
        consumer: &ConsumerId,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO log_consumptions
             (block_hash, tx_index, log_index, consumer_kind, consumer_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(log.block_hash.to_string())
        .bind(log.tx_index as i64)
        .bind(log.log_index as i64)
        .bind(kind_str(consumer.kind))
        .bind(&consumer.id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            log = %log,
            consumer = %consumer,
            inserted = result.rows_affected() > 0,
            "log consumption marked"
        );
        Ok(())
    }

    async fn count(&self) -> Result<u64, LedgerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM log_consumptions")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
