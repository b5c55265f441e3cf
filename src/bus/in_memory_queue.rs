//! In-memory transport for testing and single-process scenarios.
//!
//! [`InMemoryQueue`] implements all four transport ports:
//! - `Publisher` / `Subscriber` over an append-only log where every
//!   subscriber keeps its own read position
//! - `Sender` / `Listener` over named FIFO queues where each envelope is
//!   taken by exactly one listener

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::{Envelope, Listener, PublishError, Publisher, Sender, Subscriber};

/// In-memory transport.
///
/// Clones share the same log, queues and read position; use
/// [`InMemoryQueue::new_subscriber`] for an independent reader.
///
/// ```
/// use sourced_dispatch::bus::{Envelope, InMemoryQueue, Listener, Publisher, Sender, Subscriber};
///
/// let queue = InMemoryQueue::new();
///
/// queue.publish(Envelope::with_string_payload("evt-1", "order.placed", "{}")).unwrap();
/// assert_eq!(queue.poll(10).unwrap().unwrap().message_type, "order.placed");
///
/// queue.send("commands", Envelope::with_string_payload("cmd-1", "order.create", "{}")).unwrap();
/// assert_eq!(queue.listen("commands", 10).unwrap().unwrap().id, "cmd-1");
/// assert!(queue.listen("commands", 10).unwrap().is_none());
/// ```
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    /// Shared publish log
    log: Arc<RwLock<Vec<Envelope>>>,
    /// Read position of this subscriber
    position: Arc<Mutex<usize>>,
    /// Acknowledged envelope ids
    acked: Arc<Mutex<Vec<String>>>,
    /// Rejected envelope ids with reasons
    nacked: Arc<Mutex<Vec<(String, String)>>>,
    /// Named point-to-point queues
    queues: Arc<Mutex<HashMap<String, VecDeque<Envelope>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscriber sharing the same log and queues with its own position.
    pub fn new_subscriber(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            position: Arc::new(Mutex::new(0)),
            acked: Arc::new(Mutex::new(Vec::new())),
            nacked: Arc::new(Mutex::new(Vec::new())),
            queues: Arc::clone(&self.queues),
        }
    }

    /// Every published envelope, in order.
    pub fn published(&self) -> Vec<Envelope> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Message types of every published envelope, in order.
    pub fn published_types(&self) -> Vec<String> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.message_type.clone())
            .collect()
    }

    /// Number of published envelopes.
    pub fn len(&self) -> usize {
        self.log.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Envelopes waiting on a named queue.
    pub fn queued(&self, queue: &str) -> Vec<Envelope> {
        lock(&self.queues)
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        lock(&self.queues).get(queue).map_or(0, VecDeque::len)
    }

    pub fn acknowledged(&self) -> Vec<String> {
        lock(&self.acked).clone()
    }

    pub fn rejected(&self) -> Vec<(String, String)> {
        lock(&self.nacked).clone()
    }

    pub fn current_position(&self) -> usize {
        *lock(&self.position)
    }

    /// Clear everything (useful for test cleanup).
    pub fn clear(&self) {
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *lock(&self.position) = 0;
        lock(&self.acked).clear();
        lock(&self.nacked).clear();
        lock(&self.queues).clear();
    }

    fn wait_for<T>(timeout_ms: u64, mut take: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(found) = take() {
                return Some(found);
            }
            if Instant::now() >= deadline {
                return None;
            }
            // Small sleep to avoid busy-waiting
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Publisher for InMemoryQueue {
    fn publish(&self, envelope: Envelope) -> Result<(), PublishError> {
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
        Ok(())
    }

    fn publish_batch(&self, envelopes: Vec<Envelope>) -> Result<(), PublishError> {
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(envelopes);
        Ok(())
    }
}

impl Subscriber for InMemoryQueue {
    fn poll(&self, timeout_ms: u64) -> Result<Option<Envelope>, PublishError> {
        Ok(Self::wait_for(timeout_ms, || {
            let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
            let mut pos = lock(&self.position);
            let envelope = log.get(*pos).cloned()?;
            *pos += 1;
            Some(envelope)
        }))
    }

    fn ack(&self, envelope_id: &str) -> Result<(), PublishError> {
        lock(&self.acked).push(envelope_id.to_string());
        Ok(())
    }

    fn nack(&self, envelope_id: &str, reason: &str) -> Result<(), PublishError> {
        // No redelivery; the envelope stays in the log
        lock(&self.nacked).push((envelope_id.to_string(), reason.to_string()));
        Ok(())
    }
}

impl Sender for InMemoryQueue {
    fn send(&self, queue: &str, envelope: Envelope) -> Result<(), PublishError> {
        lock(&self.queues)
            .entry(queue.to_string())
            .or_default()
            .push_back(envelope);
        Ok(())
    }
}

impl Listener for InMemoryQueue {
    fn listen(&self, queue: &str, timeout_ms: u64) -> Result<Option<Envelope>, PublishError> {
        Ok(Self::wait_for(timeout_ms, || {
            lock(&self.queues).get_mut(queue)?.pop_front()
        }))
    }
}
