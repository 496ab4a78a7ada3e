//! chainlog-core — foundation for exactly-once contract log fan-out.
//!
//! # Architecture
//!
//! ```text
//! ChainClient ──subscribe_logs──► live queue ─┐
//!             ──get_logs──────► backfill ─────┤ combinator::append
//!                                             ▼
//!                                  merged queue → dispatch
//!                                                  ├── ConsumptionLedger (was_consumed?)
//!                                                  └── LogListener::handle_log(LogBroadcast)
//! ```
//!
//! The orchestrator lives in `chainlog-broadcaster`; decoding listeners in
//! `chainlog-evm`; the durable ledger in `chainlog-storage`.

pub mod awaiter;
pub mod broadcast;
pub mod chain;
pub mod combinator;
pub mod config;
pub mod error;
pub mod ledger;
pub mod listener;
pub mod telemetry;
pub mod types;

pub use awaiter::DependentAwaiter;
pub use broadcast::{ConsumptionBroadcast, LogBroadcast};
pub use chain::{ChainClient, LogSubscription};
pub use config::{Backoff, BroadcasterConfig};
pub use error::{ChainError, DecodeError, DeliveryError, LedgerError};
pub use ledger::{ConsumptionLedger, MemoryLedger};
pub use listener::{same_listener, ListenerRegistry, LogListener};
pub use telemetry::{init_tracing, LogConfig};
pub use types::{
    BroadcastLog, ConsumerId, ConsumerKind, DecodedLog, LogEvent, LogFilter, LogIdentity,
};
