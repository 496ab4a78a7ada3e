//! The log broadcaster: registry, subscription lifecycle and dispatch.
//!
//! # Lifecycle
//! `Uninitialized → AwaitingDependents → Subscribing → Live → Stopped`
//!
//! A single worker task owns the subscription and the merged log queue. It
//! wakes on shutdown, a watched-set change, a subscription error, or the next
//! log, in that priority order.
//!
//! Watched-set changes mark the registry dirty and wake the worker. The worker
//! waits out a short quiet period, and each snapshot of the address set clears
//! the flag, so a burst of registrations costs one resubscribe.
//!
//! # Resubscribe cycle
//! 1. Unsubscribe the previous generation and disconnect its listeners.
//!    Before the first subscription, wait for every dependent to be ready.
//! 2. `from_block` = highest block seen so far, else the chain head at first
//!    subscription (fetched once).
//! 3. Open the live subscription, then fetch the backfill from `from_block`
//!    (inclusive). Live logs buffer while the backfill runs.
//! 4. Queue = previous queue ++ backfill (chain order) ++ live.
//! 5. Connect listeners on the new addresses.
//!
//! Logs repeated at the boundary are filtered by the consumption ledger.

use std::sync::{Arc, Mutex};

use alloy_primitives::Address;
use chainlog_core::combinator::{append, backfill_channel};
use chainlog_core::{
    BroadcasterConfig, ChainClient, ChainError, ConsumptionBroadcast, ConsumptionLedger,
    DependentAwaiter, ListenerRegistry, LogBroadcast, LogEvent, LogFilter, LogListener,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::registry::{Registration, Registry};
use crate::subscription::ManagedSubscription;

// ─── State ────────────────────────────────────────────────────────────────────

/// Lifecycle state of a broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcasterState {
    #[default]
    Uninitialized,
    AwaitingDependents,
    Subscribing,
    Live,
    Stopped,
}

impl std::fmt::Display for BroadcasterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::AwaitingDependents => write!(f, "awaiting_dependents"),
            Self::Subscribing => write!(f, "subscribing"),
            Self::Live => write!(f, "live"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ─── LogBroadcaster ───────────────────────────────────────────────────────────

struct Shared {
    client: Arc<dyn ChainClient>,
    ledger: Arc<dyn ConsumptionLedger>,
    config: BroadcasterConfig,
    registry: Mutex<Registry>,
    resubscribe: Notify,
    dependents: DependentAwaiter,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn set_state(&self, state: BroadcasterState) {
        let mut registry = self.registry.lock().unwrap();
        if registry.state != BroadcasterState::Stopped {
            registry.state = state;
        }
    }
}

/// Fans contract logs out to registered listeners, exactly once per
/// (log, consumer).
///
/// Share it as `Arc<LogBroadcaster>`; it implements [`ListenerRegistry`].
pub struct LogBroadcaster {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LogBroadcaster {
    pub fn new(
        client: Arc<dyn ChainClient>,
        ledger: Arc<dyn ConsumptionLedger>,
        config: BroadcasterConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                client,
                ledger,
                config,
                registry: Mutex::new(Registry::default()),
                resubscribe: Notify::new(),
                dependents: DependentAwaiter::new(),
                shutdown,
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawn the worker. Must be called within a Tokio runtime.
    ///
    /// The first subscription waits until every dependent added through
    /// [`add_dependents`](Self::add_dependents) has reported ready.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap();
        {
            let mut registry = self.shared.registry.lock().unwrap();
            if registry.state != BroadcasterState::Uninitialized {
                warn!(state = %registry.state, "start called twice; ignoring");
                return;
            }
            registry.state = BroadcasterState::AwaitingDependents;
        }

        info!(chain = %self.shared.config.chain, "log broadcaster starting");
        let worker = Worker {
            shared: self.shared.clone(),
            shutdown: self.shared.shutdown.subscribe(),
            subscription: None,
            merged: None,
            highest_seen: None,
            start_block: None,
        };
        *task = Some(tokio::spawn(worker.run()));
    }

    /// Stop the worker, unsubscribe, and disconnect every connected listener.
    ///
    /// Logs still queued are dropped. A second call is a logged no-op.
    pub async fn stop(&self) {
        if self.shared.shutdown.send_replace(true) {
            warn!("stop called twice; ignoring");
            return;
        }

        let task = self.task.lock().unwrap().take();
        match task {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!(error = %e, "log broadcaster worker failed");
                }
            }
            None => self.shared.set_state(BroadcasterState::Stopped),
        }
        // the worker may have failed before recording it
        self.shared.registry.lock().unwrap().state = BroadcasterState::Stopped;
    }

    /// Require `n` more [`dependent_ready`](Self::dependent_ready) calls before
    /// the first subscription.
    pub fn add_dependents(&self, n: u32) {
        self.shared.dependents.add_dependents(n);
    }

    pub fn dependent_ready(&self) {
        self.shared.dependents.dependent_ready();
    }

    pub fn state(&self) -> BroadcasterState {
        self.shared.registry.lock().unwrap().state
    }

    /// Addresses with at least one registered listener.
    pub fn watched_addresses(&self) -> Vec<Address> {
        self.shared.registry.lock().unwrap().addresses()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.registry.lock().unwrap().listener_count()
    }

    pub fn config(&self) -> &BroadcasterConfig {
        &self.shared.config
    }
}

impl ListenerRegistry for LogBroadcaster {
    fn register(&self, address: Address, listener: Arc<dyn LogListener>) -> bool {
        let mut connect_now = false;
        let registration = {
            let mut registry = self.shared.registry.lock().unwrap();
            let registration = registry.insert(address, listener.clone());
            match (registration, registry.state) {
                (Registration::NewAddress, _) => self.shared.resubscribe.notify_one(),
                (Registration::ExistingAddress, BroadcasterState::Live) => {
                    connect_now = registry.is_subscribed(&address) && registry.connect(&listener);
                }
                _ => {}
            }
            registration
        };

        debug!(%address, consumer = %listener.consumer(), ?registration, "listener registered");
        if connect_now {
            listener.on_connect();
        }
        registration == Registration::NewAddress
    }

    fn unregister(&self, address: Address, listener: &Arc<dyn LogListener>) {
        let mut registry = self.shared.registry.lock().unwrap();
        let dropped = registry.remove(address, listener);
        if dropped {
            self.shared.resubscribe.notify_one();
        }
        debug!(%address, dropped, "listener unregistered");
    }
}

// ─── Worker ───────────────────────────────────────────────────────────────────

/// Returned when shutdown interrupts an operation.
struct Stopped;

enum Wake {
    Shutdown,
    Resubscribe,
    SubscriptionFailed(ChainError),
    Log(LogEvent),
}

struct Generation {
    subscription: ManagedSubscription,
    live: UnboundedReceiver<LogEvent>,
    backfill: Vec<LogEvent>,
    from_block: u64,
}

struct Worker {
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
    subscription: Option<ManagedSubscription>,
    merged: Option<UnboundedReceiver<LogEvent>>,
    /// Highest block number of any dispatched log.
    highest_seen: Option<u64>,
    /// Chain head at the first subscription, used until a log is seen.
    start_block: Option<u64>,
}

impl Worker {
    async fn run(mut self) {
        if self.settle().await.is_ok() && self.resubscribe().await.is_ok() {
            self.event_loop().await;
        }
        self.shut_down();
    }

    /// Wait out the debounce window so changes in flight land in one snapshot.
    async fn settle(&mut self) -> Result<(), Stopped> {
        let quiet = self.shared.config.debounce();
        tokio::select! {
            biased;
            _ = stopped(&mut self.shutdown) => Err(Stopped),
            _ = tokio::time::sleep(quiet) => Ok(()),
        }
    }

    async fn await_dependents(&mut self) -> Result<(), Stopped> {
        self.shared.set_state(BroadcasterState::AwaitingDependents);
        let pending = self.shared.dependents.pending();
        if pending > 0 {
            info!(pending, "awaiting dependents before subscribing");
        }
        tokio::select! {
            biased;
            _ = stopped(&mut self.shutdown) => return Err(Stopped),
            _ = self.shared.dependents.wait() => {}
        }
        self.shared.set_state(BroadcasterState::Subscribing);
        Ok(())
    }

    async fn event_loop(&mut self) {
        loop {
            let wake = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => Wake::Shutdown,
                _ = self.shared.resubscribe.notified() => Wake::Resubscribe,
                err = next_error(&mut self.subscription) => Wake::SubscriptionFailed(err),
                log = next_log(&mut self.merged) => Wake::Log(log),
            };

            let outcome = match wake {
                Wake::Shutdown => return,
                Wake::Resubscribe => {
                    if !self.shared.registry.lock().unwrap().is_dirty() {
                        debug!("watched addresses already covered; skipping resubscribe");
                        continue;
                    }
                    info!("watched addresses changed; resubscribing");
                    match self.settle().await {
                        Ok(()) => self.resubscribe().await,
                        Err(stopped) => Err(stopped),
                    }
                }
                Wake::SubscriptionFailed(err) => {
                    warn!(error = %err, retryable = err.is_retryable(), "log subscription failed; resubscribing");
                    self.resubscribe().await
                }
                Wake::Log(log) => self.dispatch(log).await,
            };
            if outcome.is_err() {
                return;
            }
        }
    }

    /// Run one resubscribe cycle, retrying until it succeeds or shutdown.
    async fn resubscribe(&mut self) -> Result<(), Stopped> {
        self.detach();

        let backoff = self.shared.config.backoff();
        let mut attempt = 0u32;
        loop {
            let addresses = self.shared.registry.lock().unwrap().snapshot();
            if addresses.is_empty() {
                info!("no watched addresses; not subscribing");
                self.attach(&addresses);
                return Ok(());
            }
            if !self.shared.dependents.has_passed() {
                self.await_dependents().await?;
                // the set may have changed while waiting
                continue;
            }

            let opened = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => return Err(Stopped),
                opened = open_generation(
                    self.shared.client.as_ref(),
                    &addresses,
                    self.highest_seen,
                    &mut self.start_block,
                ) => opened,
            };

            match opened {
                Ok(generation) => {
                    info!(
                        addresses = addresses.len(),
                        from_block = generation.from_block,
                        backfilled = generation.backfill.len(),
                        "log subscription established"
                    );
                    let incoming = append(backfill_channel(generation.backfill), generation.live);
                    self.merged = Some(match self.merged.take() {
                        Some(previous) => append(previous, incoming),
                        None => incoming,
                    });
                    self.subscription = Some(generation.subscription);
                    self.attach(&addresses);
                    return Ok(());
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = backoff.delay(attempt);
                    warn!(
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "resubscribe failed; retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = stopped(&mut self.shutdown) => return Err(Stopped),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Deliver one log to every listener on its address.
    async fn dispatch(&mut self, log: LogEvent) -> Result<(), Stopped> {
        if log.removed {
            debug!(block = log.block_number, log_index = log.log_index, "skipping removed log");
            return Ok(());
        }
        self.highest_seen = Some(self.highest_seen.map_or(log.block_number, |h| h.max(log.block_number)));

        let listeners = self.shared.registry.lock().unwrap().listeners_for(&log.address);
        for listener in listeners {
            if *self.shutdown.borrow() {
                return Err(Stopped);
            }

            let consumer = listener.consumer();
            let mut broadcast = ConsumptionBroadcast::new(
                log.clone().into(),
                consumer.clone(),
                self.shared.ledger.clone(),
            );
            match broadcast.was_already_consumed().await {
                Ok(true) => {
                    debug!(log = %broadcast.identity(), %consumer, "already consumed; skipping");
                }
                Ok(false) => {
                    debug!(log = %broadcast.identity(), %consumer, block = log.block_number, "dispatching log");
                    listener.handle_log(&mut broadcast, None).await;
                }
                Err(e) => {
                    warn!(log = %broadcast.identity(), %consumer, error = %e, "consumption check failed");
                    listener.handle_log(&mut broadcast, Some(e.into())).await;
                }
            }
        }
        Ok(())
    }

    /// Tear down the current generation.
    fn detach(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        let owed = {
            let mut registry = self.shared.registry.lock().unwrap();
            if registry.state != BroadcasterState::Stopped {
                registry.state = BroadcasterState::Subscribing;
            }
            registry.detach()
        };
        for listener in owed {
            listener.on_disconnect();
        }
    }

    fn attach(&mut self, addresses: &[Address]) {
        let fresh = {
            let mut registry = self.shared.registry.lock().unwrap();
            registry.state = BroadcasterState::Live;
            registry.attach(addresses)
        };
        for listener in fresh {
            listener.on_connect();
        }
    }

    fn shut_down(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.merged = None;
        let owed = {
            let mut registry = self.shared.registry.lock().unwrap();
            registry.state = BroadcasterState::Stopped;
            registry.detach()
        };
        for listener in owed {
            listener.on_disconnect();
        }
        info!(chain = %self.shared.config.chain, "log broadcaster stopped");
    }
}

/// Resolve `from_block`, open the live subscription, then fetch the backfill.
///
/// The chain head is fetched at most once and cached in `start_block`.
async fn open_generation(
    client: &dyn ChainClient,
    addresses: &[Address],
    highest_seen: Option<u64>,
    start_block: &mut Option<u64>,
) -> Result<Generation, ChainError> {
    let from_block = match highest_seen.or(*start_block) {
        Some(block) => block,
        None => {
            let head = client.latest_block().await?;
            *start_block = Some(head);
            head
        }
    };

    let filter = LogFilter::addresses(addresses.iter().copied());
    let (subscription, live) = ManagedSubscription::open(client, &filter).await?;
    let backfill = client.get_logs(&filter.from_block(from_block)).await?;

    Ok(Generation {
        subscription,
        live,
        backfill,
        from_block,
    })
}

/// Resolves once shutdown is signalled.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

async fn next_error(subscription: &mut Option<ManagedSubscription>) -> ChainError {
    if let Some(subscription) = subscription {
        if let Some(err) = subscription.err().await {
            return err;
        }
    }
    std::future::pending().await
}

async fn next_log(merged: &mut Option<UnboundedReceiver<LogEvent>>) -> LogEvent {
    if let Some(queue) = merged {
        if let Some(log) = queue.recv().await {
            return log;
        }
        *merged = None;
    }
    std::future::pending().await
}
