use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ListenerRegistry, ListenerResult, RaisedEvents};
use crate::container::{Container, InMemoryContainer};
use crate::message::DomainEvent;
use crate::pipeline::{Middleware, Pipeline};

/// Dispatches domain events.
pub trait DomainEventDispatcher {
    fn dispatch(&mut self, event: Box<dyn DomainEvent>) -> ListenerResult;
}

/// A dispatcher that holds events back until told to flush or forget them.
pub trait DeferredEventDispatcher: DomainEventDispatcher {
    /// Deliver every buffered event, oldest first, including any raised by
    /// listeners along the way. Fail-fast; the buffer is empty afterwards.
    fn flush(&mut self) -> ListenerResult;

    /// Drop every buffered event without delivering it.
    fn forget(&mut self);
}

/// Routes domain events through their middleware pipeline to listeners.
#[derive(Clone)]
pub struct EventRouter {
    listeners: Arc<ListenerRegistry>,
    pipeline: Pipeline<dyn DomainEvent, ListenerResult>,
    container: Arc<dyn Container>,
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    pub fn new(listeners: Arc<ListenerRegistry>) -> Self {
        Self {
            listeners,
            pipeline: Pipeline::new(),
            container: Arc::new(InMemoryContainer::new()),
        }
    }

    pub fn with_middleware(
        mut self,
        middleware: Arc<dyn Middleware<dyn DomainEvent, ListenerResult>>,
    ) -> Self {
        self.pipeline.push(middleware);
        self
    }

    pub fn with_container(mut self, container: Arc<dyn Container>) -> Self {
        self.container = container;
        self
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }

    /// Deliver `pending` until it is empty.
    pub fn drain(&self, pending: RaisedEvents) -> ListenerResult {
        let pending = RefCell::new(pending);
        loop {
            let next = pending.borrow_mut().pop_front();
            let Some(event) = next else {
                return Ok(());
            };

            debug!(event = event.name(), "delivering domain event");
            let pipeline = self.pipeline.clone().extend(event.middleware());
            let delivered = pipeline.run(event.as_ref(), |event| {
                self.listeners.notify(
                    event.as_any(),
                    &mut pending.borrow_mut(),
                    self.container.as_ref(),
                )
            });

            if let Err(err) = delivered {
                let dropped = pending.borrow().names();
                if !dropped.is_empty() {
                    warn!(
                        failed = event.name(),
                        dropped = ?dropped,
                        "flush stopped; discarding remaining domain events"
                    );
                }
                return Err(err);
            }
        }
    }
}

/// Buffers domain events for the duration of one unit-of-work attempt.
#[derive(Debug)]
pub struct DeferredDispatcher {
    router: EventRouter,
    buffer: RaisedEvents,
}

impl DeferredDispatcher {
    pub fn new(router: EventRouter) -> Self {
        Self {
            router,
            buffer: RaisedEvents::new(),
        }
    }

    pub fn raise<E: DomainEvent>(&mut self, event: E) {
        self.buffer.raise(event);
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn pending_names(&self) -> Vec<&'static str> {
        self.buffer.names()
    }
}

impl DomainEventDispatcher for DeferredDispatcher {
    fn dispatch(&mut self, event: Box<dyn DomainEvent>) -> ListenerResult {
        self.buffer.push(event);
        Ok(())
    }
}

impl DeferredEventDispatcher for DeferredDispatcher {
    fn flush(&mut self) -> ListenerResult {
        let pending = std::mem::take(&mut self.buffer);
        self.router.drain(pending)
    }

    fn forget(&mut self) {
        if !self.buffer.is_empty() {
            debug!(dropped = ?self.buffer.names(), "forgetting buffered domain events");
        }
        self.buffer.clear();
    }
}

/// Delivers each event as soon as it is dispatched.
#[derive(Debug, Clone)]
pub struct ImmediateDispatcher {
    router: EventRouter,
}

impl ImmediateDispatcher {
    pub fn new(router: EventRouter) -> Self {
        Self { router }
    }
}

impl DomainEventDispatcher for ImmediateDispatcher {
    fn dispatch(&mut self, event: Box<dyn DomainEvent>) -> ListenerResult {
        self.router.drain(RaisedEvents::from(event))
    }
}
