//! Background workers that feed queued envelopes back into a [`Dispatcher`].
//!
//! [`CommandWorker`] drains a named point-to-point queue filled by
//! `Dispatcher::queue_command`. [`InboundWorker`] polls a fan-out
//! subscription and hands integration events to their listeners,
//! acknowledging the ones that were handled.

use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::{Listener, Subscriber};
use crate::dispatcher::Dispatcher;

/// Counters returned when a worker stops.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    /// Envelopes dispatched successfully.
    pub handled: usize,
    /// Envelopes whose dispatch failed.
    pub failed: usize,
    /// Poll cycles completed.
    pub polls: usize,
}

/// Handle to a worker thread. Drop it or call [`WorkerHandle::stop`] to shut
/// the worker down.
pub struct WorkerHandle {
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl WorkerHandle {
    fn spawn<F>(mut poll_once: F) -> Self
    where
        F: FnMut(&mut WorkerStats) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let mut stats = WorkerStats::default();
            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }
                stats.polls += 1;
                poll_once(&mut stats);
            }
            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop the worker and wait for it. Returns its stats.
    pub fn stop(mut self) -> WorkerStats {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => WorkerStats::default(),
        }
    }

    /// Signal stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

/// Executes queued commands.
///
/// ```ignore
/// let dispatcher = Arc::new(builder.queue(Arc::new(queue.clone()), "orders").build());
/// let worker = CommandWorker::spawn(
///     dispatcher.clone(),
///     "orders",
///     queue.clone(),
///     Duration::from_millis(20),
/// );
///
/// dispatcher.queue_command(CreateOrder { items: vec!["SKU-1".into()] });
///
/// let stats = worker.stop();
/// ```
pub struct CommandWorker;

impl CommandWorker {
    /// Each envelope goes to exactly one worker listening on `queue_name`.
    /// There is no caller to return a failure to, so failures are logged
    /// and counted.
    pub fn spawn<L>(
        dispatcher: Arc<Dispatcher>,
        queue_name: impl Into<String>,
        listener: L,
        poll_interval: Duration,
    ) -> WorkerHandle
    where
        L: Listener + 'static,
    {
        let queue_name = queue_name.into();
        let timeout_ms = poll_interval.as_millis() as u64;

        WorkerHandle::spawn(move |stats| match listener.listen(&queue_name, timeout_ms) {
            Ok(Some(envelope)) => match dispatcher.dispatch_envelope(&envelope) {
                Ok(()) => {
                    debug!(
                        id = %envelope.id,
                        message_type = %envelope.message_type,
                        "queued command handled"
                    );
                    stats.handled += 1;
                }
                Err(failure) => {
                    warn!(
                        id = %envelope.id,
                        message_type = %envelope.message_type,
                        reason = %failure.reason,
                        error = %failure.message,
                        "queued command failed"
                    );
                    stats.failed += 1;
                }
            },
            Ok(None) => {}
            Err(err) => warn!(queue = %queue_name, error = %err, "listen failed"),
        })
    }
}

/// Delivers inbound integration events from a subscription.
pub struct InboundWorker;

impl InboundWorker {
    /// Handled envelopes are acknowledged; failed ones are nacked with the
    /// listener error as the reason.
    pub fn spawn<S>(
        dispatcher: Arc<Dispatcher>,
        subscriber: S,
        poll_interval: Duration,
    ) -> WorkerHandle
    where
        S: Subscriber + 'static,
    {
        let timeout_ms = poll_interval.as_millis() as u64;

        WorkerHandle::spawn(move |stats| match subscriber.poll(timeout_ms) {
            Ok(Some(envelope)) => match dispatcher.dispatch_inbound_envelope(&envelope) {
                Ok(()) => {
                    if let Err(err) = subscriber.ack(&envelope.id) {
                        warn!(id = %envelope.id, error = %err, "ack failed");
                    }
                    stats.handled += 1;
                }
                Err(err) => {
                    warn!(
                        id = %envelope.id,
                        message_type = %envelope.message_type,
                        error = %err,
                        "inbound event failed"
                    );
                    if let Err(err) = subscriber.nack(&envelope.id, &err.to_string()) {
                        warn!(id = %envelope.id, error = %err, "nack failed");
                    }
                    stats.failed += 1;
                }
            },
            Ok(None) => {}
            Err(err) => warn!(error = %err, "poll failed"),
        })
    }
}
