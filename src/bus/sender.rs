//! Sender trait for point-to-point messaging.

use super::{Envelope, PublishError};

/// Sends envelopes to a named queue (point-to-point).
///
/// This is the queue port behind `Dispatcher::queue_command`: a successful
/// send only means the queue accepted the envelope.
pub trait Sender: Send + Sync {
    fn send(&self, queue: &str, envelope: Envelope) -> Result<(), PublishError>;
}
