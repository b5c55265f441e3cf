//! Listener trait for point-to-point messaging.

use super::{Envelope, PublishError};

/// Listens on a named queue (point-to-point).
///
/// Unlike [`Subscriber`](super::Subscriber), listeners on the same queue
/// compete: each envelope is delivered to exactly one of them.
pub trait Listener: Send + Sync {
    /// Take the next envelope from `queue`, waiting up to `timeout_ms`.
    fn listen(&self, queue: &str, timeout_ms: u64) -> Result<Option<Envelope>, PublishError>;
}
