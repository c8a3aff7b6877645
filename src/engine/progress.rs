//! Progress/cancellation channel shared by the export and import engines.
//!
//! Single producer (the engine, on a blocking worker thread), single
//! consumer (the caller, typically the CLI, on the async runtime). The
//! engines do synchronous SQLite and file I/O, so they run under
//! `tokio::task::spawn_blocking` and the sender uses `blocking_send`;
//! runtime worker threads never execute engine code. Events are
//! delivered strictly in production order. At most one terminal event
//! (`Completed` or `Failed`) is emitted per operation, and this is
//! enforced at the type level: the terminal senders consume the
//! [`ProgressSender`]. A stream that ends without a terminal event
//! means the operation was cancelled.
//!
//! Cancellation is a shared atomic flag checked cooperatively between
//! units of work, never a preemptive interrupt: the unit in flight
//! finishes before the engine stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::PackboxError;

/// Channel capacity. Producers suspend when the consumer lags.
const CHANNEL_CAPACITY: usize = 32;

/// Lifecycle events of one export or import operation.
#[derive(Debug)]
pub enum ProgressEvent<S> {
    /// Fraction complete in `0.0..=1.0`, monotonically non-decreasing.
    Progress(f64),
    /// Terminal: the operation finished and produced a summary.
    Completed(S),
    /// Terminal: the operation failed.
    Failed(PackboxError),
}

impl<S> ProgressEvent<S> {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// Cooperative cancellation flag, cloned into the engine task.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The engine stops at the next unit boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The consumer half: an ordered stream of [`ProgressEvent`]s.
pub type ProgressStream<S> = ReceiverStream<ProgressEvent<S>>;

/// Create a progress channel pair.
#[must_use]
pub fn channel<S>() -> (ProgressSender<S>, ProgressStream<S>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        ProgressSender {
            tx,
            last_fraction: 0.0,
        },
        ReceiverStream::new(rx),
    )
}

/// Producer half. Clamps fractions to be monotone and guarantees a
/// single terminal event by consuming itself on `complete`/`fail`.
///
/// Sends block the producer thread when the channel is full, so this
/// half must live on a blocking worker thread, never on a runtime
/// worker.
#[derive(Debug)]
pub struct ProgressSender<S> {
    tx: mpsc::Sender<ProgressEvent<S>>,
    last_fraction: f64,
}

impl<S> ProgressSender<S> {
    /// Report a fraction complete. Regressions are clamped to the last
    /// reported value; values above 1.0 are clamped down.
    pub fn progress(&mut self, fraction: f64) {
        let fraction = fraction.clamp(self.last_fraction, 1.0);
        self.last_fraction = fraction;
        // A dropped receiver is not an error: the engine also watches
        // the cancel flag and will stop on its own.
        let _ = self.tx.blocking_send(ProgressEvent::Progress(fraction));
    }

    /// Emit the terminal `Completed` event.
    pub fn complete(self, summary: S) {
        let _ = self.tx.blocking_send(ProgressEvent::Completed(summary));
    }

    /// Emit the terminal `Failed` event.
    pub fn fail(self, error: PackboxError) {
        let _ = self.tx.blocking_send(ProgressEvent::Failed(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    async fn collect<S: std::fmt::Debug>(stream: ProgressStream<S>) -> Vec<ProgressEvent<S>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let (mut tx, rx) = channel::<u32>();
        let producer = tokio::task::spawn_blocking(move || {
            tx.progress(0.25);
            tx.progress(0.5);
            tx.complete(7);
        });

        let events = collect(rx).await;
        producer.await.unwrap();

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ProgressEvent::Progress(f) if (f - 0.25).abs() < 1e-9));
        assert!(matches!(events[1], ProgressEvent::Progress(f) if (f - 0.5).abs() < 1e-9));
        assert!(matches!(events[2], ProgressEvent::Completed(7)));
    }

    #[tokio::test]
    async fn test_fractions_are_monotone() {
        let (mut tx, rx) = channel::<()>();
        tokio::task::spawn_blocking(move || {
            tx.progress(0.6);
            tx.progress(0.4); // regression, clamped
            tx.progress(2.0); // overshoot, clamped
            tx.complete(());
        });

        let mut last = 0.0;
        let events = collect(rx).await;
        for event in &events {
            if let ProgressEvent::Progress(f) = event {
                assert!(*f >= last, "fraction regressed: {f} < {last}");
                assert!(*f <= 1.0);
                last = *f;
            }
        }
    }

    #[tokio::test]
    async fn test_cancelled_stream_ends_without_terminal() {
        let cancel = CancelFlag::new();
        let (mut tx, rx) = channel::<()>();

        let worker_cancel = cancel.clone();
        cancel.cancel();
        tokio::task::spawn_blocking(move || {
            for step in 1..=10 {
                if worker_cancel.is_cancelled() {
                    return; // drop tx: stream ends, no terminal event
                }
                tx.progress(f64::from(step) / 10.0);
            }
            tx.complete(());
        });

        let events = collect(rx).await;
        assert!(events.iter().all(|e| !e.is_terminal()));
    }

    #[tokio::test]
    async fn test_failure_is_single_terminal_event() {
        let (mut tx, rx) = channel::<()>();
        tokio::task::spawn_blocking(move || {
            tx.progress(0.5);
            tx.fail(PackboxError::Cancelled);
            // tx consumed: no further events possible
        });

        let events = collect(rx).await;
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(events.last(), Some(ProgressEvent::Failed(_))));
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
