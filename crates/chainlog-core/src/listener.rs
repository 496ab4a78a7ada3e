//! Listener capability and the registry seam listeners are registered through.

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::broadcast::LogBroadcast;
use crate::error::DeliveryError;
use crate::types::ConsumerId;

/// A consumer of contract logs.
///
/// Listeners are shared (`Arc`) between the registering component and the
/// broadcaster, so every method takes `&self`. Implementations that track
/// state use interior mutability.
#[async_trait]
pub trait LogListener: Send + Sync {
    /// Called when a log subscription covering this listener's address is
    /// established.
    fn on_connect(&self);

    /// Called when that subscription is torn down (resubscribe or stop).
    fn on_disconnect(&self);

    /// Deliver one log.
    ///
    /// `err` is set only for delivery-scoped failures (ledger unavailable,
    /// decode failure). Network errors are never passed here.
    async fn handle_log(&self, broadcast: &mut dyn LogBroadcast, err: Option<DeliveryError>);

    /// Stable identity used as the consumer half of the consumption key.
    fn consumer(&self) -> ConsumerId;
}

/// Where listeners are registered. Implemented by the broadcaster and by test
/// doubles.
pub trait ListenerRegistry: Send + Sync {
    /// Register `listener` for logs emitted by `address`.
    ///
    /// Returns `true` if `address` was not previously watched.
    fn register(&self, address: Address, listener: Arc<dyn LogListener>) -> bool;

    /// Remove a prior registration. Unknown pairs are ignored.
    fn unregister(&self, address: Address, listener: &Arc<dyn LogListener>);
}

/// Listener identity is pointer identity of the shared allocation.
pub fn same_listener(a: &Arc<dyn LogListener>, b: &Arc<dyn LogListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
