//! One generation of the live log subscription.
//!
//! The chain client's sink may outlive `unsubscribe` (the client, or a test,
//! can still hold a sender). A pump task therefore sits between the client's
//! queue and the combinator: on close it stops reading, forwards what was
//! already buffered, and drops its output so the next generation can drain.

use chainlog_core::{ChainClient, ChainError, LogEvent, LogFilter, LogSubscription};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

pub(crate) struct ManagedSubscription {
    inner: Box<dyn LogSubscription>,
    close: Option<oneshot::Sender<()>>,
}

impl ManagedSubscription {
    /// Subscribe and return the generation's live queue.
    pub(crate) async fn open(
        client: &dyn ChainClient,
        filter: &LogFilter,
    ) -> Result<(Self, UnboundedReceiver<LogEvent>), ChainError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let inner = client.subscribe_logs(filter, raw_tx).await?;

        let (close_tx, close_rx) = oneshot::channel();
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(raw_rx, live_tx, close_rx));

        Ok((
            Self {
                inner,
                close: Some(close_tx),
            },
            live_rx,
        ))
    }

    /// Unsubscribe from the client and close the live queue. Idempotent.
    pub(crate) fn unsubscribe(&mut self) {
        if let Some(close) = self.close.take() {
            self.inner.unsubscribe();
            let _ = close.send(());
        }
    }

    pub(crate) async fn err(&mut self) -> Option<ChainError> {
        if self.close.is_none() {
            return None;
        }
        self.inner.err().await
    }
}

impl Drop for ManagedSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

async fn pump(
    mut raw: UnboundedReceiver<LogEvent>,
    live: UnboundedSender<LogEvent>,
    mut close: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            // a dropped sender closes too
            _ = &mut close => break,
            log = raw.recv() => match log {
                Some(log) => {
                    if live.send(log).is_err() {
                        return;
                    }
                }
                None => return,
            },
        }
    }

    raw.close();
    while let Ok(log) = raw.try_recv() {
        if live.send(log).is_err() {
            return;
        }
    }
}
