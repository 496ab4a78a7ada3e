//! Error types for the log broadcasting pipeline.

use alloy_primitives::B256;
use thiserror::Error;

/// Errors raised by the chain client collaborator.
///
/// All of these are recovered by the broadcaster's resubscribe protocol and
/// never reach a listener.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Log subscription closed: {reason}")]
    SubscriptionClosed { reason: String },

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl ChainError {
    /// Returns `true` if the error is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Rpc(_) | Self::SubscriptionClosed { .. } | Self::Timeout { .. }
        )
    }
}

/// Errors from a consumption ledger backend.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors raised while decoding a raw log into a typed record.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("Log has no topics; cannot resolve event signature")]
    MissingTopic,

    #[error("ABI decode failed for {event}: {reason}")]
    AbiDecodeFailed { event: String, reason: String },

    #[error("Topic {topic} does not match event {event}")]
    TopicMismatch { topic: B256, event: String },

    #[error("Invalid event signature '{signature}': {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("Field '{field}' missing or of unexpected type in {event}")]
    FieldType { event: String, field: String },
}

/// The error handed to a listener through `handle_log(broadcast, Some(err))`.
///
/// Only failures scoped to a single delivery surface here; network failures
/// are absorbed by the broadcaster.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("consumption ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),

    #[error("log decode failed: {0}")]
    Decode(#[from] DecodeError),
}

impl DeliveryError {
    /// Returns `true` if the delivery failed because the ledger was unreachable.
    pub fn is_ledger(&self) -> bool {
        matches!(self, Self::Ledger(_))
    }
}
