//! Dispatcher facade.
//!
//! Routes commands and queries to their single handler, queues commands for
//! asynchronous execution, delivers inbound integration events to listeners
//! and runs units of work.
//!
//! Command and query pipeline, outermost first:
//!
//! 1. global middleware (type-erased, sees every command and query)
//! 2. middleware registered for the message type
//! 3. middleware declared by the message itself
//! 4. the handler
//!
//! ```ignore
//! let dispatcher = Dispatcher::builder(uow)
//!     .middleware(Arc::new(LoggingMiddleware::default()))
//!     .command(|cmd: &CreateOrder| -> HandlerResult<OrderId> { orders.create(cmd) })?
//!     .query(|q: &GetOrder| -> HandlerResult<Order> { orders.get(&q.id) })?
//!     .queue(Arc::new(queue.clone()), "orders")
//!     .build();
//!
//! let id = dispatcher.dispatch_command(CreateOrder { items: vec!["SKU-1".into()] })?;
//! ```

mod builder;

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::bus::{Encoding, Envelope, PublishError, Sender};
use crate::container::Container;
use crate::events::{ListenerError, ListenerResult, RaisedEvents};
use crate::failure::{DispatchResult, Failure};
use crate::handler::{HandlerError, HandlerResult};
use crate::message::{Command, IntegrationEvent, Message, Query};
use crate::pipeline::Pipeline;
use crate::registry::HandlerRegistry;
use crate::unit_of_work::{TransactionError, UnitOfWork, UnitOfWorkError, UnitOfWorkScope};

pub use builder::DispatcherBuilder;

/// Message-dispatch core. Built once with [`Dispatcher::builder`], then
/// shared (usually behind an `Arc`).
pub struct Dispatcher {
    handlers: HandlerRegistry,
    middleware: Pipeline<dyn Message, HandlerResult<()>>,
    inbound: Pipeline<dyn IntegrationEvent, ListenerResult>,
    container: Arc<dyn Container>,
    unit_of_work: UnitOfWork,
    queue: Option<Arc<dyn Sender>>,
    queue_pipeline: Pipeline<Envelope, Result<(), PublishError>>,
    queue_name: String,
    encoding: Encoding,
    sequence: AtomicU64,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.handlers.command_names())
            .field("middleware", &self.middleware)
            .field("queue_name", &self.queue_name)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn builder(unit_of_work: UnitOfWork) -> DispatcherBuilder {
        DispatcherBuilder::new(unit_of_work)
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.unit_of_work
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Dispatch `command` to its handler.
    ///
    /// Fails with `HandlerNotFound` when no handler is registered (or a
    /// named one cannot be resolved). Handler errors map to failures as
    /// described on [`HandlerError`].
    pub fn dispatch_command<C: Command>(&self, command: C) -> DispatchResult<C::Output> {
        let name = C::message_name();
        let Some(resolver) = self.handlers.command::<C>() else {
            debug!(message_type = name, "no command handler registered");
            return Err(Failure::handler_not_found(name));
        };
        let handler = resolver.resolve(self.container.as_ref()).map_err(|err| {
            warn!(message_type = name, error = %err, "command handler could not be resolved");
            Failure::handler_not_found(name)
        })?;

        let typed = self
            .handlers
            .command_pipeline::<C>()
            .extend(Command::middleware(&command));

        self.run(&command, |command: &C| {
            typed.run(command, |command| handler.handle(command))
        })
    }

    /// Dispatch `query` to its handler. Same resolution and pipeline as
    /// commands; queries are never queued.
    pub fn dispatch_query<Q: Query>(&self, query: Q) -> DispatchResult<Q::Output> {
        let name = Q::message_name();
        let Some(resolver) = self.handlers.query::<Q>() else {
            debug!(message_type = name, "no query handler registered");
            return Err(Failure::handler_not_found(name));
        };
        let handler = resolver.resolve(self.container.as_ref()).map_err(|err| {
            warn!(message_type = name, error = %err, "query handler could not be resolved");
            Failure::handler_not_found(name)
        })?;

        let typed = self
            .handlers
            .query_pipeline::<Q>()
            .extend(Query::middleware(&query));

        self.run(&query, |query: &Q| {
            typed.run(query, |query| handler.handle(query))
        })
    }

    /// Push `command` onto the command queue and return immediately.
    ///
    /// Nothing comes back to the caller: a failed push is logged and handed
    /// to the error reporter. Delivery and retries are up to the queue.
    pub fn queue_command<C: Command>(&self, command: C) {
        match self.push_command(&command) {
            Ok(id) => debug!(
                message_type = C::message_name(),
                id = %id,
                queue = %self.queue_name,
                "command queued"
            ),
            Err(err) => {
                warn!(
                    message_type = C::message_name(),
                    error = %err,
                    "command could not be queued"
                );
                self.unit_of_work.reporter().report(&err);
            }
        }
    }

    /// Decode a queued command envelope by name and dispatch it.
    ///
    /// The handler's output is dropped; there is no caller to return it to.
    pub fn dispatch_envelope(&self, envelope: &Envelope) -> DispatchResult<()> {
        match self.handlers.routes(&envelope.message_type) {
            [] => Err(Failure::handler_not_found(&envelope.message_type)),
            [(_, route)] => route(self, envelope),
            routes => Err(Failure::ambiguous_handler(
                &envelope.message_type,
                routes.len(),
            )),
        }
    }

    /// Deliver an integration event received from outside to its listeners,
    /// in registration order, through the inbound pipeline. Domain events
    /// raised by those listeners are dispatched right after.
    pub fn dispatch_inbound_event<E: IntegrationEvent>(&self, event: E) -> ListenerResult {
        let router = self.unit_of_work.router();
        let raised = RefCell::new(RaisedEvents::new());
        let pipeline = self
            .inbound
            .clone()
            .extend(IntegrationEvent::middleware(&event));

        debug!(
            message_type = E::message_name(),
            event_id = event.event_id(),
            "inbound integration event"
        );
        pipeline.run(&event, |event| {
            router.listeners().notify(
                event.as_any(),
                &mut raised.borrow_mut(),
                router.container().as_ref(),
            )
        })?;

        router.drain(raised.into_inner())
    }

    /// Decode an inbound envelope by name and deliver it.
    pub fn dispatch_inbound_envelope(&self, envelope: &Envelope) -> ListenerResult {
        let listeners = self.unit_of_work.router().listeners();
        match listeners.inbound_routes(&envelope.message_type) {
            [] => Err(ListenerError::UnknownEvent(envelope.message_type.clone())),
            [(_, route)] => route(self, envelope),
            routes => Err(ListenerError::Ambiguous {
                name: envelope.message_type.clone(),
                count: routes.len(),
            }),
        }
    }

    /// Run `body` as a unit of work with the configured default attempts.
    pub fn run_unit_of_work<T, F>(&self, body: F) -> Result<T, UnitOfWorkError>
    where
        F: FnMut(&mut UnitOfWorkScope) -> Result<T, TransactionError>,
    {
        self.unit_of_work.run(body)
    }

    /// Run `body` as a unit of work, up to `attempts` times.
    pub fn run_unit_of_work_with_attempts<T, F>(
        &self,
        attempts: u32,
        body: F,
    ) -> Result<T, UnitOfWorkError>
    where
        F: FnMut(&mut UnitOfWorkScope) -> Result<T, TransactionError>,
    {
        self.unit_of_work.execute(attempts, body)
    }

    /// Drive `message` through global middleware into `terminal`.
    ///
    /// Global middleware only sees `&dyn Message`, so the typed output
    /// travels beside the pipeline in `slot`.
    fn run<M, T, F>(&self, message: &M, terminal: F) -> DispatchResult<T>
    where
        M: Message,
        F: Fn(&M) -> HandlerResult<T>,
    {
        let slot = RefCell::new(None);
        let result = self.middleware.run(message, |erased| {
            let typed = erased.as_any().downcast_ref::<M>().ok_or_else(|| {
                HandlerError::unexpected(format!(
                    "middleware replaced {} with {}",
                    M::message_name(),
                    erased.name()
                ))
            })?;
            *slot.borrow_mut() = Some(terminal(typed)?);
            Ok(())
        });

        match result {
            Ok(()) => slot.into_inner().ok_or_else(|| {
                Failure::unexpected(format!(
                    "middleware for {} returned without a result",
                    M::message_name()
                ))
            }),
            Err(err) => {
                debug!(message_type = M::message_name(), reason = %err.reason(), "dispatch failed");
                Err(err.into_failure())
            }
        }
    }

    fn push_command<C: Command>(&self, command: &C) -> Result<String, PublishError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or(PublishError::NotConfigured("command queue"))?;
        let id = format!(
            "cmd-{}-{}",
            Utc::now().timestamp_millis(),
            self.sequence.fetch_add(1, Ordering::Relaxed)
        );
        let envelope =
            Envelope::encode_with(id.as_str(), C::message_name(), command, self.encoding)?;
        self.queue_pipeline.run(&envelope, |envelope| {
            queue.send(&self.queue_name, envelope.clone())
        })?;
        Ok(id)
    }
}

pub(crate) fn route_command_envelope<C: Command>(
    dispatcher: &Dispatcher,
    envelope: &Envelope,
) -> DispatchResult<()> {
    let command: C = envelope
        .decode()
        .map_err(|err| Failure::decode_failed(C::message_name(), err))?;
    dispatcher.dispatch_command(command).map(|_| ())
}

pub(crate) fn route_inbound_envelope<E: IntegrationEvent + DeserializeOwned>(
    dispatcher: &Dispatcher,
    envelope: &Envelope,
) -> ListenerResult {
    let event: E = envelope.decode().map_err(|err| ListenerError::Decode {
        name: E::message_name().to_string(),
        reason: err.to_string(),
    })?;
    dispatcher.dispatch_inbound_event(event)
}
