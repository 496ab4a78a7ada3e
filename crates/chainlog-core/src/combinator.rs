//! Channel combinator: ordered concatenation of log queues.
//!
//! `append(a, b)` yields everything from `a` (in arrival order) and only then
//! everything from `b`, closing once both have closed. Outputs are valid
//! inputs, so successive subscription generations chain as
//! `append(append(previous, backfill), live)` without dropping in-flight logs.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::types::LogEvent;

/// Concatenate two queues.
///
/// Forwarding runs on a spawned task; it stops early if the output receiver
/// is dropped.
pub fn append<T: Send + 'static>(
    first: UnboundedReceiver<T>,
    second: UnboundedReceiver<T>,
) -> UnboundedReceiver<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        for source in [first, second] {
            if !forward(source, &tx).await {
                return;
            }
        }
    });
    rx
}

/// Drain `source` into `tx`. Returns `false` if the output was closed.
async fn forward<T>(mut source: UnboundedReceiver<T>, tx: &UnboundedSender<T>) -> bool {
    loop {
        tokio::select! {
            _ = tx.closed() => return false,
            item = source.recv() => match item {
                Some(item) => {
                    if tx.send(item).is_err() {
                        return false;
                    }
                }
                None => return true,
            },
        }
    }
}

/// A closed queue pre-loaded with `logs` in chain order.
pub fn backfill_channel(mut logs: Vec<LogEvent>) -> UnboundedReceiver<LogEvent> {
    logs.sort_by_key(LogEvent::chain_position);
    let (tx, rx) = mpsc::unbounded_channel();
    for log in logs {
        // receiver is alive in this scope
        let _ = tx.send(log);
    }
    rx
}
