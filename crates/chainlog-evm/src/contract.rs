//! A contract address bound to its event table and a listener registry.

use std::sync::Arc;

use alloy_primitives::Address;
use chainlog_core::{ListenerRegistry, LogListener};

use crate::decoding::{DecodingLogListener, EventTypes};

/// Contract wrapper that subscribes listeners to its decoded logs.
#[derive(Clone)]
pub struct ConnectedContract {
    address: Address,
    types: Arc<EventTypes>,
    registry: Arc<dyn ListenerRegistry>,
}

impl ConnectedContract {
    pub fn new(address: Address, types: Arc<EventTypes>, registry: Arc<dyn ListenerRegistry>) -> Self {
        Self {
            address,
            types,
            registry,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn event_types(&self) -> &Arc<EventTypes> {
        &self.types
    }

    /// Register `listener` for this contract's logs, decoded.
    ///
    /// Returns whether the contract address was newly watched, and a handle
    /// that removes the registration.
    pub fn subscribe_to_logs(&self, listener: Arc<dyn LogListener>) -> (bool, Unsubscribe) {
        let decoding: Arc<dyn LogListener> =
            Arc::new(DecodingLogListener::new(self.types.clone(), listener));
        let connected = self.registry.register(self.address, decoding.clone());
        let handle = Unsubscribe {
            address: self.address,
            listener: decoding,
            registry: self.registry.clone(),
            done: false,
        };
        (connected, handle)
    }
}

/// Removes a registration made by [`ConnectedContract::subscribe_to_logs`].
///
/// Dropping the handle does not unregister.
pub struct Unsubscribe {
    address: Address,
    listener: Arc<dyn LogListener>,
    registry: Arc<dyn ListenerRegistry>,
    done: bool,
}

impl Unsubscribe {
    /// Unregister. Subsequent calls are no-ops.
    pub fn unsubscribe(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.registry.unregister(self.address, &self.listener);
    }
}
