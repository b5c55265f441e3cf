//! Publisher trait and transport errors.

use crate::error::BoxError;

use super::Envelope;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Connection to the transport failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The payload could not be encoded or decoded
    #[error("serialization failed: {0}")]
    SerializationFailed(String),
    /// The transport rejected the envelope
    #[error("envelope rejected: {0}")]
    Rejected(String),
    /// Timed out waiting for acknowledgment
    #[error("publish timeout")]
    Timeout,
    /// No transport is wired for this operation
    #[error("no transport configured for {0}")]
    NotConfigured(&'static str),
    #[error("publish error: {0}")]
    Other(#[source] BoxError),
}

/// Publishes envelopes to every subscriber (fan-out).
///
/// Adapters might wrap Kafka, NATS, RabbitMQ or a CloudEvents endpoint.
pub trait Publisher: Send + Sync {
    fn publish(&self, envelope: Envelope) -> Result<(), PublishError>;

    /// Publish several envelopes. Sequential by default; adapters may batch.
    fn publish_batch(&self, envelopes: Vec<Envelope>) -> Result<(), PublishError> {
        for envelope in envelopes {
            self.publish(envelope)?;
        }
        Ok(())
    }
}
