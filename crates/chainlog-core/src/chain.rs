//! Chain client collaborator: the broadcaster's only view of the node.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChainError;
use crate::types::{LogEvent, LogFilter};

/// RPC surface needed for log broadcasting.
///
/// Implementations wrap a JSON-RPC transport (`eth_blockNumber`,
/// `eth_getLogs`, `eth_subscribe("logs")`).
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number.
    async fn latest_block(&self) -> Result<u64, ChainError>;

    /// Historical logs matching `filter`, from `filter.from_block` (inclusive)
    /// to head.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEvent>, ChainError>;

    /// Open a live log subscription. Matching logs are pushed into `sink`
    /// until the subscription is unsubscribed or fails.
    async fn subscribe_logs(
        &self,
        filter: &LogFilter,
        sink: mpsc::UnboundedSender<LogEvent>,
    ) -> Result<Box<dyn LogSubscription>, ChainError>;
}

/// Handle to an open live subscription.
#[async_trait]
pub trait LogSubscription: Send {
    /// Stop delivery. Must be safe to call more than once.
    fn unsubscribe(&mut self);

    /// Resolves when the subscription fails.
    ///
    /// Returns `None` once the error stream is closed (e.g. after
    /// `unsubscribe`); callers should stop polling at that point.
    async fn err(&mut self) -> Option<ChainError>;
}
