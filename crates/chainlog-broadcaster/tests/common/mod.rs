//! Shared test doubles: a scripted chain client and recording listeners.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chainlog_broadcaster::{BroadcasterBuilder, LogBroadcaster};
use chainlog_core::{
    ChainClient, ChainError, ConsumerId, ConsumptionLedger, DeliveryError, LogBroadcast, LogEvent,
    LogFilter, LogListener, LogSubscription,
};
use tokio::sync::{mpsc, Notify};

pub const TIMEOUT: Duration = Duration::from_secs(5);

// ─── MockChain ────────────────────────────────────────────────────────────────

/// The producer side of one live subscription, handed to the test.
pub struct LiveFeed {
    pub filter: LogFilter,
    sink: mpsc::UnboundedSender<LogEvent>,
    errors: mpsc::UnboundedSender<ChainError>,
}

impl LiveFeed {
    pub fn send(&self, log: LogEvent) {
        // after unsubscribe the broadcaster stops reading; that is fine here
        let _ = self.sink.send(log);
    }

    pub fn fail(&self, err: ChainError) {
        self.errors.send(err).expect("subscription error channel open");
    }
}

/// Live feeds in subscription order.
pub struct Feeds(mpsc::UnboundedReceiver<LiveFeed>);

impl Feeds {
    pub async fn next(&mut self) -> LiveFeed {
        tokio::time::timeout(TIMEOUT, self.0.recv())
            .await
            .expect("timed out waiting for a subscription")
            .expect("mock chain dropped")
    }

    pub fn try_next(&mut self) -> Option<LiveFeed> {
        self.0.try_recv().ok()
    }
}

/// Scripted chain client recording every call.
pub struct MockChain {
    latest: Mutex<u64>,
    get_logs_responses: Mutex<VecDeque<Result<Vec<LogEvent>, ChainError>>>,
    subscribe_failures: Mutex<VecDeque<ChainError>>,
    feeds: mpsc::UnboundedSender<LiveFeed>,
    pub latest_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub unsubscribe_calls: Arc<AtomicUsize>,
    get_logs_filters: Mutex<Vec<LogFilter>>,
}

impl MockChain {
    pub fn new(latest: u64) -> (Arc<Self>, Feeds) {
        let (feeds, rx) = mpsc::unbounded_channel();
        let chain = Arc::new(Self {
            latest: Mutex::new(latest),
            get_logs_responses: Mutex::new(VecDeque::new()),
            subscribe_failures: Mutex::new(VecDeque::new()),
            feeds,
            latest_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: Arc::new(AtomicUsize::new(0)),
            get_logs_filters: Mutex::new(Vec::new()),
        });
        (chain, Feeds(rx))
    }

    pub fn set_latest(&self, block: u64) {
        *self.latest.lock().unwrap() = block;
    }

    /// Queue the result of the next `get_logs` call. Unscripted calls return
    /// no logs.
    pub fn push_get_logs(&self, response: Result<Vec<LogEvent>, ChainError>) {
        self.get_logs_responses.lock().unwrap().push_back(response);
    }

    /// Make the next `subscribe_logs` call fail.
    pub fn fail_next_subscribe(&self, err: ChainError) {
        self.subscribe_failures.lock().unwrap().push_back(err);
    }

    pub fn subscribes(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn get_logs_filters(&self) -> Vec<LogFilter> {
        self.get_logs_filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn latest_block(&self) -> Result<u64, ChainError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.latest.lock().unwrap())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEvent>, ChainError> {
        self.get_logs_filters.lock().unwrap().push(filter.clone());
        self.get_logs_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Vec::new()))
    }

    async fn subscribe_logs(
        &self,
        filter: &LogFilter,
        sink: mpsc::UnboundedSender<LogEvent>,
    ) -> Result<Box<dyn LogSubscription>, ChainError> {
        if let Some(err) = self.subscribe_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        let (errors, errors_rx) = mpsc::unbounded_channel();
        let _ = self.feeds.send(LiveFeed {
            filter: filter.clone(),
            sink,
            errors,
        });
        Ok(Box::new(MockSubscription {
            errors: errors_rx,
            unsubscribes: self.unsubscribe_calls.clone(),
        }))
    }
}

pub struct MockSubscription {
    errors: mpsc::UnboundedReceiver<ChainError>,
    unsubscribes: Arc<AtomicUsize>,
}

#[async_trait]
impl LogSubscription for MockSubscription {
    fn unsubscribe(&mut self) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.errors.close();
    }

    async fn err(&mut self) -> Option<ChainError> {
        self.errors.recv().await
    }
}

// ─── Listeners ────────────────────────────────────────────────────────────────

/// What a [`RecordingListener`] does with each delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consume {
    /// Record only.
    Never,
    /// Record and mark consumed.
    Mark,
    /// Assert unconsumed, mark, assert consumed.
    Verify,
}

pub struct RecordingListener {
    consumer: ConsumerId,
    mode: Consume,
    received: Mutex<Vec<LogEvent>>,
    errors: Mutex<Vec<DeliveryError>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    /// When set, each delivery waits for a permit after recording.
    gate: Option<Arc<Notify>>,
}

impl RecordingListener {
    pub fn new(id: &str, mode: Consume) -> Arc<Self> {
        Arc::new(Self::build(id, mode, None))
    }

    pub fn gated(id: &str, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self::build(id, Consume::Mark, Some(gate)))
    }

    fn build(id: &str, mode: Consume, gate: Option<Arc<Notify>>) -> Self {
        Self {
            consumer: ConsumerId::job(id),
            mode,
            received: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            gate,
        }
    }

    pub fn received(&self) -> Vec<LogEvent> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_blocks(&self) -> Vec<u64> {
        self.received().iter().map(|l| l.block_number).collect()
    }

    pub fn errors(&self) -> Vec<DeliveryError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogListener for RecordingListener {
    fn on_connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn handle_log(&self, broadcast: &mut dyn LogBroadcast, err: Option<DeliveryError>) {
        if let Some(err) = err {
            self.errors.lock().unwrap().push(err);
            return;
        }
        self.received
            .lock()
            .unwrap()
            .push(broadcast.log().raw().clone());

        match self.mode {
            Consume::Never => {}
            Consume::Mark => broadcast.mark_consumed().await.unwrap(),
            Consume::Verify => {
                assert!(!broadcast.was_already_consumed().await.unwrap());
                broadcast.mark_consumed().await.unwrap();
                assert!(broadcast.was_already_consumed().await.unwrap());
            }
        }

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }

    fn consumer(&self) -> ConsumerId {
        self.consumer.clone()
    }
}

pub fn as_listener(listener: &Arc<RecordingListener>) -> Arc<dyn LogListener> {
    listener.clone()
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Broadcaster with fast retries and a short debounce.
pub fn broadcaster(chain: Arc<MockChain>, ledger: Arc<dyn ConsumptionLedger>) -> Arc<LogBroadcaster> {
    Arc::new(
        BroadcasterBuilder::new()
            .chain("test")
            .resubscribe_backoff_ms(10, 50)
            .resubscribe_debounce_ms(10)
            .build(chain, ledger),
    )
}

pub fn address(n: u8) -> Address {
    Address::repeat_byte(n)
}

/// A log at `block` with a block hash unique to (`block`, `fork`).
pub fn log_at(address: Address, block: u64, fork: u8) -> LogEvent {
    let mut hash = [0u8; 32];
    hash[..8].copy_from_slice(&block.to_be_bytes());
    hash[31] = fork;
    LogEvent {
        address,
        block_number: block,
        block_hash: B256::from(hash),
        ..Default::default()
    }
}

/// Poll `condition` until it holds or [`TIMEOUT`] elapses.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Assert `condition` keeps holding for a short window.
pub async fn consistently(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..10 {
        assert!(condition(), "condition no longer holds: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn ledger_count_eventually(ledger: &dyn ConsumptionLedger, expected: u64) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let count = ledger.count().await.unwrap();
        if count == expected {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("ledger holds {count} records, expected {expected}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
