//! Subscriber trait for fan-out messaging.

use super::{Envelope, PublishError};

/// Pull-based subscription to published envelopes.
pub trait Subscriber: Send + Sync {
    /// Poll for the next envelope, waiting up to `timeout_ms`.
    fn poll(&self, timeout_ms: u64) -> Result<Option<Envelope>, PublishError>;

    /// Acknowledge that an envelope has been processed.
    fn ack(&self, envelope_id: &str) -> Result<(), PublishError>;

    /// Reject an envelope (redelivered or dead-lettered by the transport).
    fn nack(&self, envelope_id: &str, reason: &str) -> Result<(), PublishError>;
}
