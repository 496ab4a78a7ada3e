//! Listener registry: address → listeners, plus the connected set of the
//! current subscription generation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use alloy_primitives::Address;
use chainlog_core::{same_listener, LogListener};

use crate::broadcaster::BroadcasterState;

/// Result of adding a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    /// The (address, listener) pair was already present.
    Duplicate,
    /// First listener for this address; the watched set changed.
    NewAddress,
    /// Address already watched by another listener.
    ExistingAddress,
}

/// Registry state. Always accessed under the broadcaster's mutex.
#[derive(Default)]
pub(crate) struct Registry {
    listeners: BTreeMap<Address, Vec<Arc<dyn LogListener>>>,
    /// Addresses covered by the live subscription.
    subscribed: BTreeSet<Address>,
    /// Listeners that received `on_connect` and are owed `on_disconnect`.
    connected: Vec<Arc<dyn LogListener>>,
    /// Watched set changed since the last snapshot.
    dirty: bool,
    pub(crate) state: BroadcasterState,
}

impl Registry {
    pub(crate) fn insert(&mut self, address: Address, listener: Arc<dyn LogListener>) -> Registration {
        let entry = self.listeners.entry(address).or_default();
        if entry.iter().any(|l| same_listener(l, &listener)) {
            return Registration::Duplicate;
        }
        let new_address = entry.is_empty();
        entry.push(listener);
        if new_address {
            self.dirty = true;
            Registration::NewAddress
        } else {
            Registration::ExistingAddress
        }
    }

    /// Remove a registration. Returns `true` if `address` left the watched set.
    pub(crate) fn remove(&mut self, address: Address, listener: &Arc<dyn LogListener>) -> bool {
        let Some(entry) = self.listeners.get_mut(&address) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|l| !same_listener(l, listener));
        if entry.len() == before {
            return false;
        }
        if entry.is_empty() {
            self.listeners.remove(&address);
            self.dirty = true;
            return true;
        }
        false
    }

    /// Watched addresses, sorted.
    pub(crate) fn addresses(&self) -> Vec<Address> {
        self.listeners.keys().copied().collect()
    }

    /// Watched addresses for a new subscription. Clears the change flag.
    pub(crate) fn snapshot(&mut self) -> Vec<Address> {
        self.dirty = false;
        self.addresses()
    }

    /// Returns `true` if the watched set changed since the last snapshot.
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn listeners_for(&self, address: &Address) -> Vec<Arc<dyn LogListener>> {
        self.listeners.get(address).cloned().unwrap_or_default()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub(crate) fn is_subscribed(&self, address: &Address) -> bool {
        self.subscribed.contains(address)
    }

    /// Mark `listener` connected. Returns `false` if it already was.
    pub(crate) fn connect(&mut self, listener: &Arc<dyn LogListener>) -> bool {
        if self.connected.iter().any(|c| same_listener(c, listener)) {
            return false;
        }
        self.connected.push(listener.clone());
        true
    }

    /// Record the addresses of a new subscription and connect every listener
    /// on them. Returns the listeners owed `on_connect`.
    pub(crate) fn attach(&mut self, addresses: &[Address]) -> Vec<Arc<dyn LogListener>> {
        self.subscribed = addresses.iter().copied().collect();

        let mut fresh: Vec<Arc<dyn LogListener>> = Vec::new();
        for (address, listeners) in &self.listeners {
            if !self.subscribed.contains(address) {
                continue;
            }
            for listener in listeners {
                let seen = self.connected.iter().chain(&fresh).any(|c| same_listener(c, listener));
                if !seen {
                    fresh.push(listener.clone());
                }
            }
        }
        self.connected.extend(fresh.iter().cloned());
        fresh
    }

    /// Forget the current subscription. Returns the listeners owed
    /// `on_disconnect`.
    pub(crate) fn detach(&mut self) -> Vec<Arc<dyn LogListener>> {
        self.subscribed.clear();
        std::mem::take(&mut self.connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlog_core::{ConsumerId, DeliveryError, LogBroadcast};

    struct Stub;

    #[async_trait::async_trait]
    impl LogListener for Stub {
        fn on_connect(&self) {}
        fn on_disconnect(&self) {}
        async fn handle_log(&self, _: &mut dyn LogBroadcast, _: Option<DeliveryError>) {}
        fn consumer(&self) -> ConsumerId {
            ConsumerId::job("stub")
        }
    }

    fn listener() -> Arc<dyn LogListener> {
        Arc::new(Stub)
    }

    #[test]
    fn insert_reports_address_changes() {
        let mut reg = Registry::default();
        let a = Address::repeat_byte(1);
        let (l1, l2) = (listener(), listener());

        assert_eq!(reg.insert(a, l1.clone()), Registration::NewAddress);
        assert_eq!(reg.insert(a, l2.clone()), Registration::ExistingAddress);
        assert_eq!(reg.insert(a, l1.clone()), Registration::Duplicate);
        assert_eq!(reg.listener_count(), 2);

        assert!(!reg.remove(a, &l1));
        assert!(!reg.remove(a, &l1));
        assert!(reg.remove(a, &l2));
        assert!(reg.addresses().is_empty());
    }

    #[test]
    fn snapshot_absorbs_pending_changes() {
        let mut reg = Registry::default();
        let (a, b) = (Address::repeat_byte(1), Address::repeat_byte(2));
        let (l1, l2) = (listener(), listener());

        reg.insert(a, l1.clone());
        reg.insert(b, l2.clone());
        assert!(reg.is_dirty());
        assert_eq!(reg.snapshot(), vec![a, b]);
        assert!(!reg.is_dirty());

        // same address, no change to the watched set
        reg.insert(a, l2.clone());
        assert!(!reg.is_dirty());
        reg.remove(a, &l2);
        assert!(!reg.is_dirty());

        reg.remove(b, &l2);
        assert!(reg.is_dirty());
        assert_eq!(reg.snapshot(), vec![a]);
        assert!(!reg.is_dirty());
    }

    #[test]
    fn one_listener_on_many_addresses_connects_once() {
        let mut reg = Registry::default();
        let (a, b) = (Address::repeat_byte(1), Address::repeat_byte(2));
        let shared = listener();
        reg.insert(a, shared.clone());
        reg.insert(b, shared.clone());

        let connected = reg.attach(&[a, b]);
        assert_eq!(connected.len(), 1);
        assert!(!reg.connect(&shared));
        assert!(reg.is_subscribed(&b));

        let owed = reg.detach();
        assert_eq!(owed.len(), 1);
        assert!(!reg.is_subscribed(&a));
        assert!(reg.detach().is_empty());
    }

    #[test]
    fn attach_skips_addresses_outside_subscription() {
        let mut reg = Registry::default();
        let (a, b) = (Address::repeat_byte(1), Address::repeat_byte(2));
        reg.insert(a, listener());
        reg.insert(b, listener());
        assert_eq!(reg.attach(&[a]).len(), 1);
    }
}
