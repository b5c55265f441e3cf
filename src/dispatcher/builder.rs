use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use super::Dispatcher;
use crate::bus::{Encoding, Envelope, PublishError, Sender};
use crate::config::{ConfigError, DispatchConfig, DEFAULT_COMMAND_QUEUE};
use crate::container::{resolve, Container, ContainerError, InMemoryContainer, Resolver};
use crate::error::RegistrationError;
use crate::events::ListenerResult;
use crate::handler::{CommandHandler, HandlerResult, QueryHandler};
use crate::message::{Command, IntegrationEvent, Message, Query};
use crate::pipeline::{Middleware, Pipeline};
use crate::registry::HandlerRegistry;
use crate::unit_of_work::{ErrorReporter, UnitOfWork};

/// Collects handlers, middleware and ports, then freezes them into a
/// [`Dispatcher`]. Registration is only possible here.
pub struct DispatcherBuilder {
    handlers: HandlerRegistry,
    middleware: Pipeline<dyn Message, HandlerResult<()>>,
    inbound: Pipeline<dyn IntegrationEvent, ListenerResult>,
    container: Arc<dyn Container>,
    unit_of_work: UnitOfWork,
    queue: Option<Arc<dyn Sender>>,
    queue_pipeline: Pipeline<Envelope, Result<(), PublishError>>,
    queue_name: String,
    encoding: Encoding,
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("commands", &self.handlers.command_names())
            .field("queue_name", &self.queue_name)
            .finish_non_exhaustive()
    }
}

impl DispatcherBuilder {
    pub(crate) fn new(unit_of_work: UnitOfWork) -> Self {
        Self {
            handlers: HandlerRegistry::new(),
            middleware: Pipeline::new(),
            inbound: Pipeline::new(),
            container: Arc::new(InMemoryContainer::new()),
            unit_of_work,
            queue: None,
            queue_pipeline: Pipeline::new(),
            queue_name: DEFAULT_COMMAND_QUEUE.to_string(),
            encoding: Encoding::default(),
        }
    }

    /// Register a closure handler for `C`.
    pub fn command<C, F>(self, handler: F) -> Result<Self, RegistrationError>
    where
        C: Command,
        F: Fn(&C) -> HandlerResult<C::Output> + Send + Sync + 'static,
    {
        self.command_handler::<C>(Arc::new(handler))
    }

    /// Register a handler instance for `C`.
    pub fn command_handler<C: Command>(
        mut self,
        handler: Arc<dyn CommandHandler<C>>,
    ) -> Result<Self, RegistrationError> {
        self.handlers
            .register_command(Resolver::Instance(handler))?;
        Ok(self)
    }

    /// Register a handler for `C` that is looked up in the container under
    /// `name` on every dispatch.
    pub fn named_command<C, H>(mut self, name: impl Into<String>) -> Result<Self, RegistrationError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        self.handlers.register_command(Resolver::Named {
            name: name.into(),
            resolve: Arc::new(
                |container: &dyn Container,
                 name: &str|
                 -> Result<Arc<dyn CommandHandler<C>>, ContainerError> {
                    let handler: Arc<dyn CommandHandler<C>> = resolve::<H>(container, name)?;
                    Ok(handler)
                },
            ),
        })?;
        Ok(self)
    }

    /// Register a closure handler for `Q`.
    pub fn query<Q, F>(self, handler: F) -> Result<Self, RegistrationError>
    where
        Q: Query,
        F: Fn(&Q) -> HandlerResult<Q::Output> + Send + Sync + 'static,
    {
        self.query_handler::<Q>(Arc::new(handler))
    }

    /// Register a handler instance for `Q`.
    pub fn query_handler<Q: Query>(
        mut self,
        handler: Arc<dyn QueryHandler<Q>>,
    ) -> Result<Self, RegistrationError> {
        self.handlers.register_query(Resolver::Instance(handler))?;
        Ok(self)
    }

    /// Register a handler for `Q` resolved from the container under `name`.
    pub fn named_query<Q, H>(mut self, name: impl Into<String>) -> Result<Self, RegistrationError>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        self.handlers.register_query(Resolver::Named {
            name: name.into(),
            resolve: Arc::new(
                |container: &dyn Container,
                 name: &str|
                 -> Result<Arc<dyn QueryHandler<Q>>, ContainerError> {
                    let handler: Arc<dyn QueryHandler<Q>> = resolve::<H>(container, name)?;
                    Ok(handler)
                },
            ),
        })?;
        Ok(self)
    }

    /// Middleware for every `C`, inside global middleware.
    pub fn command_middleware<C: Command>(
        mut self,
        middleware: Arc<dyn Middleware<C, HandlerResult<C::Output>>>,
    ) -> Self {
        self.handlers.add_command_middleware(middleware);
        self
    }

    /// Middleware for every `Q`, inside global middleware.
    pub fn query_middleware<Q: Query>(
        mut self,
        middleware: Arc<dyn Middleware<Q, HandlerResult<Q::Output>>>,
    ) -> Self {
        self.handlers.add_query_middleware(middleware);
        self
    }

    /// Global middleware around every command and query.
    pub fn middleware(
        mut self,
        middleware: Arc<dyn Middleware<dyn Message, HandlerResult<()>>>,
    ) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Middleware around delivery of inbound integration events.
    pub fn inbound_middleware(
        mut self,
        middleware: Arc<dyn Middleware<dyn IntegrationEvent, ListenerResult>>,
    ) -> Self {
        self.inbound.push(middleware);
        self
    }

    /// Container for named handlers and listeners.
    pub fn container(mut self, container: Arc<dyn Container>) -> Self {
        self.unit_of_work = self.unit_of_work.with_container(Arc::clone(&container));
        self.container = container;
        self
    }

    /// Queue port and queue name used by `queue_command`.
    pub fn queue(mut self, sender: Arc<dyn Sender>, queue_name: impl Into<String>) -> Self {
        self.queue = Some(sender);
        self.queue_name = queue_name.into();
        self
    }

    /// Middleware around every queue push.
    pub fn queue_middleware(
        mut self,
        middleware: Arc<dyn Middleware<Envelope, Result<(), PublishError>>>,
    ) -> Self {
        self.queue_pipeline.push(middleware);
        self
    }

    /// Payload encoding for queued commands.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.unit_of_work = self.unit_of_work.with_reporter(reporter);
        self
    }

    /// Apply a validated config: default attempts, retry delay and, when the
    /// config names one, the command queue.
    pub fn config(mut self, config: &DispatchConfig) -> Result<Self, ConfigError> {
        self.unit_of_work = self.unit_of_work.with_config(config)?;
        if let Some(queue_name) = &config.command_queue {
            self.queue_name = queue_name.clone();
        }
        Ok(self)
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            handlers: self.handlers,
            middleware: self.middleware,
            inbound: self.inbound,
            container: self.container,
            unit_of_work: self.unit_of_work,
            queue: self.queue,
            queue_pipeline: self.queue_pipeline,
            queue_name: self.queue_name,
            encoding: self.encoding,
            sequence: AtomicU64::new(0),
        }
    }
}
