//! Domain and integration event delivery.
//!
//! Listeners are registered per event type in a [`ListenerRegistry`] and
//! notified in registration order. Domain events raised during a unit of work
//! go to a [`DeferredDispatcher`] and only reach listeners when it is flushed
//! after commit; [`ImmediateDispatcher`] delivers straight away.
//!
//! ## Flush policy
//!
//! Flushing is fail-fast. The first listener error stops the flush and is
//! returned; events still buffered at that point are dropped, so the buffer is
//! always empty when `flush` returns. Events raised by listeners during a
//! flush are appended and drained by the same flush.

mod dispatcher;
mod registry;

use std::collections::VecDeque;

use crate::container::ContainerError;
use crate::error::BoxError;
use crate::message::DomainEvent;

pub use dispatcher::{
    DeferredDispatcher, DeferredEventDispatcher, DomainEventDispatcher, EventRouter,
    ImmediateDispatcher,
};
pub use registry::ListenerRegistry;

/// Outcome of delivering one event.
pub type ListenerResult = Result<(), ListenerError>;

/// Errors raised while delivering events to listeners.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("listener for {event} failed: {source}")]
    Failed {
        event: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("could not resolve listener {name}: {source}")]
    Resolve {
        name: String,
        #[source]
        source: ContainerError,
    },
    #[error("no integration event is registered as {0}")]
    UnknownEvent(String),
    #[error("{count} integration event types are registered as {name}")]
    Ambiguous { name: String, count: usize },
    #[error("could not decode {name}: {reason}")]
    Decode { name: String, reason: String },
}

/// Receives events of type `E`.
///
/// Events raised into `raised` are delivered after the current one, within
/// the same flush.
pub trait EventListener<E>: Send + Sync {
    fn handle(&self, event: &E, raised: &mut RaisedEvents) -> Result<(), BoxError>;
}

impl<E, F> EventListener<E> for F
where
    F: Fn(&E, &mut RaisedEvents) -> Result<(), BoxError> + Send + Sync,
{
    fn handle(&self, event: &E, raised: &mut RaisedEvents) -> Result<(), BoxError> {
        self(event, raised)
    }
}

/// FIFO buffer of raised domain events.
#[derive(Debug, Default)]
pub struct RaisedEvents {
    events: VecDeque<Box<dyn DomainEvent>>,
}

impl RaisedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise<E: DomainEvent>(&mut self, event: E) {
        self.events.push_back(Box::new(event));
    }

    pub fn push(&mut self, event: Box<dyn DomainEvent>) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Names of the buffered events, oldest first.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(|event| event.name()).collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub(crate) fn pop_front(&mut self) -> Option<Box<dyn DomainEvent>> {
        self.events.pop_front()
    }
}

impl From<Box<dyn DomainEvent>> for RaisedEvents {
    fn from(event: Box<dyn DomainEvent>) -> Self {
        let mut raised = RaisedEvents::new();
        raised.push(event);
        raised
    }
}
