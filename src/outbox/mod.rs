//! Outbound integration events.
//!
//! [`OutboundPublisher`] encodes integration events into envelopes, runs them
//! through the outbound middleware pipeline and pushes them to an [`Outbox`].
//! Inside a unit of work, [`OutboundPublisher::publish_after_commit`] defers
//! the push until the transaction has committed, so subscribers never see an
//! event from a rolled back transaction.

mod outbound;
mod publisher;

pub use outbound::OutboundPublisher;
#[cfg(feature = "emitter")]
pub use publisher::EmitterOutbox;
pub use publisher::LogOutbox;

use crate::bus::{Envelope, PublishError, Publisher};

/// Accepts envelopes for reliable, asynchronous delivery.
///
/// Every bus [`Publisher`] is an outbox; durable implementations store the
/// envelope and relay it later.
pub trait Outbox: Send + Sync {
    fn push(&self, envelope: Envelope) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Outbox for P {
    fn push(&self, envelope: Envelope) -> Result<(), PublishError> {
        self.publish(envelope)
    }
}
