use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::Outbox;
use crate::bus::{Encoding, Envelope, PublishError};
use crate::error::BoxError;
use crate::message::IntegrationEvent;
use crate::pipeline::{Middleware, Pipeline};
use crate::unit_of_work::UnitOfWorkScope;

/// Metadata key carrying the event's occurrence time (RFC 3339).
pub const OCCURRED_AT: &str = "occurred-at";

/// Publishes integration events through the outbound pipeline to an outbox.
///
/// ```ignore
/// let publisher = OutboundPublisher::new(Arc::new(outbox))
///     .with_middleware(Arc::new(CorrelationIds));
///
/// uow.run(|scope| {
///     let order = orders.place(&cmd)?;
///     publisher.publish_after_commit(scope, &OrderAccepted::from(&order))?;
///     Ok(order.id)
/// })?;
/// ```
#[derive(Clone)]
pub struct OutboundPublisher {
    outbox: Arc<dyn Outbox>,
    pipeline: Pipeline<Envelope, Result<(), PublishError>>,
    encoding: Encoding,
}

impl fmt::Debug for OutboundPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundPublisher")
            .field("pipeline", &self.pipeline)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl OutboundPublisher {
    pub fn new(outbox: Arc<dyn Outbox>) -> Self {
        Self {
            outbox,
            pipeline: Pipeline::new(),
            encoding: Encoding::default(),
        }
    }

    pub fn with_middleware(
        mut self,
        middleware: Arc<dyn Middleware<Envelope, Result<(), PublishError>>>,
    ) -> Self {
        self.pipeline.push(middleware);
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Encode `event` the way [`OutboundPublisher::publish`] would.
    pub fn envelope<E>(&self, event: &E) -> Result<Envelope, PublishError>
    where
        E: IntegrationEvent + Serialize,
    {
        Ok(
            Envelope::encode_with(event.event_id(), E::message_name(), event, self.encoding)?
                .with_metadata(OCCURRED_AT, event.occurred_at().to_rfc3339()),
        )
    }

    /// Encode and push `event` now.
    pub fn publish<E>(&self, event: &E) -> Result<(), PublishError>
    where
        E: IntegrationEvent + Serialize,
    {
        let envelope = self.envelope(event)?;
        self.push(envelope)
    }

    /// Push an already encoded envelope through the pipeline.
    pub fn push(&self, envelope: Envelope) -> Result<(), PublishError> {
        debug!(
            id = %envelope.id,
            message_type = %envelope.message_type,
            "publishing integration event"
        );
        self.pipeline
            .run(&envelope, |envelope| self.outbox.push(envelope.clone()))
    }

    /// Encode `event` now and push it once `scope` has committed.
    ///
    /// Nothing is pushed if the unit of work rolls back or is retried; a
    /// retried body registers the push again on its new scope. Push errors
    /// after commit go to the unit of work's reporter.
    pub fn publish_after_commit<E>(
        &self,
        scope: &mut UnitOfWorkScope,
        event: &E,
    ) -> Result<(), PublishError>
    where
        E: IntegrationEvent + Serialize,
    {
        let envelope = self.envelope(event)?;
        let publisher = self.clone();
        scope.after_commit(move || publisher.push(envelope).map_err(BoxError::from));
        Ok(())
    }
}
