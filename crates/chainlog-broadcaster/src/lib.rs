//! chainlog-broadcaster — exactly-once fan-out of contract logs.
//!
//! # Architecture
//!
//! ```text
//! BroadcasterBuilder → LogBroadcaster
//!                          ├── Registry            (address → listeners, connected set)
//!                          ├── DependentAwaiter    (gates the first subscription)
//!                          ├── ManagedSubscription (one per generation)
//!                          ├── combinator          (previous ++ backfill ++ live)
//!                          └── ConsumptionLedger   (skip already-consumed pairs)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use alloy_primitives::Address;
//! # use chainlog_core::{ChainClient, ListenerRegistry, LogListener, MemoryLedger};
//! use chainlog_broadcaster::BroadcasterBuilder;
//!
//! # async fn example(client: Arc<dyn ChainClient>, listener: Arc<dyn LogListener>) {
//! let broadcaster = Arc::new(
//!     BroadcasterBuilder::new().build(client, Arc::new(MemoryLedger::new())),
//! );
//! broadcaster.start();
//! broadcaster.register(Address::ZERO, listener);
//! // ...
//! broadcaster.stop().await;
//! # }
//! ```

pub mod broadcaster;
pub mod builder;
mod registry;
mod subscription;

pub use broadcaster::{BroadcasterState, LogBroadcaster};
pub use builder::BroadcasterBuilder;
