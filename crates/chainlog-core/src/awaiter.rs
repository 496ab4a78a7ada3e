//! Dependent countdown gating the first subscription.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::warn;

/// Countdown of consumers that must be ready before the first subscription.
///
/// The gate latches the first time `wait` observes a zero count. Until then
/// `add_dependents` may raise the count at any time, so a caller that only
/// awaits the gate when it is about to subscribe can arm it after starting.
/// Once latched, further `add_dependents` calls are logged and ignored.
pub struct DependentAwaiter {
    pending: watch::Sender<u32>,
    passed: AtomicBool,
}

impl Default for DependentAwaiter {
    fn default() -> Self {
        Self::new()
    }
}

impl DependentAwaiter {
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            pending,
            passed: AtomicBool::new(false),
        }
    }

    pub fn add_dependents(&self, n: u32) {
        let mut refused = false;
        // checked under the channel lock so it cannot interleave with the latch
        self.pending.send_if_modified(|count| {
            if self.passed.load(Ordering::SeqCst) {
                refused = true;
                return false;
            }
            *count = count.saturating_add(n);
            true
        });
        if refused {
            warn!(n, "add_dependents called after dependents were awaited; ignoring");
        }
    }

    pub fn dependent_ready(&self) {
        self.pending.send_modify(|count| {
            if *count == 0 {
                warn!("dependent_ready called more times than dependents were added");
            } else {
                *count -= 1;
            }
        });
    }

    /// Outstanding dependents.
    pub fn pending(&self) -> u32 {
        *self.pending.borrow()
    }

    /// Resolve once every added dependent reported ready, latching the gate.
    pub async fn wait(&self) {
        let mut rx = self.pending.subscribe();
        loop {
            // sender lives in self; the channel cannot close while we wait
            let _ = rx.wait_for(|count| *count == 0).await;

            let mut latched = false;
            self.pending.send_if_modified(|count| {
                if *count == 0 {
                    self.passed.store(true, Ordering::SeqCst);
                    latched = true;
                }
                false
            });
            if latched {
                return;
            }
        }
    }

    /// Returns `true` once the gate has latched.
    pub fn has_passed(&self) -> bool {
        self.passed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn passes_immediately_without_dependents() {
        let awaiter = DependentAwaiter::new();
        tokio::time::timeout(Duration::from_secs(1), awaiter.wait())
            .await
            .unwrap();
        assert!(awaiter.has_passed());
    }

    #[tokio::test]
    async fn waits_for_every_dependent() {
        let awaiter = Arc::new(DependentAwaiter::new());
        awaiter.add_dependents(2);

        let waiter = {
            let awaiter = awaiter.clone();
            tokio::spawn(async move { awaiter.wait().await })
        };

        awaiter.dependent_ready();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(awaiter.pending(), 1);

        awaiter.dependent_ready();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(awaiter.has_passed());
    }

    #[tokio::test]
    async fn extra_ready_calls_do_not_underflow() {
        let awaiter = DependentAwaiter::new();
        awaiter.dependent_ready();
        assert_eq!(awaiter.pending(), 0);
        awaiter.add_dependents(1);
        assert_eq!(awaiter.pending(), 1);
    }

    #[tokio::test]
    async fn arming_is_accepted_until_first_wait() {
        let awaiter = Arc::new(DependentAwaiter::new());
        awaiter.dependent_ready();
        awaiter.add_dependents(2);
        assert!(!awaiter.has_passed());
        assert_eq!(awaiter.pending(), 2);

        let waiter = {
            let awaiter = awaiter.clone();
            tokio::spawn(async move { awaiter.wait().await })
        };
        awaiter.dependent_ready();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert!(!awaiter.has_passed());

        awaiter.dependent_ready();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(awaiter.has_passed());
    }

    #[tokio::test]
    async fn add_after_pass_is_ignored() {
        let awaiter = DependentAwaiter::new();
        awaiter.wait().await;
        awaiter.add_dependents(3);
        assert_eq!(awaiter.pending(), 0);
    }
}
