//! chainlog-storage — durable consumption ledgers for ChainLog.
//!
//! # Backends
//!
//! | Backend | Feature | Use case |
//! |---------|---------|----------|
//! | In-memory (`chainlog_core::MemoryLedger`) | — | Tests, development |
//! | SQLite | `sqlite` (default) | Single-node production, restarts |

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;
