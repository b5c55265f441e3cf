//! Handler registry.
//!
//! Exactly one handler per command or query type, keyed by `TypeId`. A name
//! index maps `Message::message_name` to the command types carrying it so
//! queued envelopes can be routed back to a typed dispatch. Populated while
//! building the [`Dispatcher`](crate::Dispatcher) and read-only afterwards.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::bus::Envelope;
use crate::container::Resolver;
use crate::dispatcher::{route_command_envelope, Dispatcher};
use crate::error::RegistrationError;
use crate::failure::DispatchResult;
use crate::handler::{CommandHandler, HandlerResult, QueryHandler};
use crate::message::{Command, Query};
use crate::pipeline::{Middleware, Pipeline};

/// Decodes a queued envelope into its command type and dispatches it.
pub(crate) type EnvelopeRoute = fn(&Dispatcher, &Envelope) -> DispatchResult<()>;

type Entry = Box<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    commands: HashMap<TypeId, Entry>,
    queries: HashMap<TypeId, Entry>,
    command_middleware: HashMap<TypeId, Entry>,
    query_middleware: HashMap<TypeId, Entry>,
    names: HashMap<&'static str, Vec<(TypeId, EnvelopeRoute)>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `C`. A second registration for the same
    /// type is rejected.
    pub fn register_command<C: Command>(
        &mut self,
        handler: Resolver<dyn CommandHandler<C>>,
    ) -> Result<(), RegistrationError> {
        let id = TypeId::of::<C>();
        if self.commands.contains_key(&id) {
            return Err(RegistrationError::DuplicateHandler(C::message_name()));
        }
        self.commands.insert(id, Box::new(handler));
        self.names
            .entry(C::message_name())
            .or_default()
            .push((id, route_command_envelope::<C>));
        Ok(())
    }

    /// Register the handler for `Q`. A second registration for the same
    /// type is rejected.
    pub fn register_query<Q: Query>(
        &mut self,
        handler: Resolver<dyn QueryHandler<Q>>,
    ) -> Result<(), RegistrationError> {
        let id = TypeId::of::<Q>();
        if self.queries.contains_key(&id) {
            return Err(RegistrationError::DuplicateHandler(Q::message_name()));
        }
        self.queries.insert(id, Box::new(handler));
        Ok(())
    }

    /// Append middleware that runs for every `C`, inside global middleware.
    pub fn add_command_middleware<C: Command>(
        &mut self,
        middleware: Arc<dyn Middleware<C, HandlerResult<C::Output>>>,
    ) {
        let mut pipeline = self.command_pipeline::<C>();
        pipeline.push(middleware);
        self.command_middleware
            .insert(TypeId::of::<C>(), Box::new(pipeline));
    }

    /// Append middleware that runs for every `Q`, inside global middleware.
    pub fn add_query_middleware<Q: Query>(
        &mut self,
        middleware: Arc<dyn Middleware<Q, HandlerResult<Q::Output>>>,
    ) {
        let mut pipeline = self.query_pipeline::<Q>();
        pipeline.push(middleware);
        self.query_middleware
            .insert(TypeId::of::<Q>(), Box::new(pipeline));
    }

    pub fn command<C: Command>(&self) -> Option<&Resolver<dyn CommandHandler<C>>> {
        self.commands.get(&TypeId::of::<C>())?.downcast_ref()
    }

    pub fn query<Q: Query>(&self) -> Option<&Resolver<dyn QueryHandler<Q>>> {
        self.queries.get(&TypeId::of::<Q>())?.downcast_ref()
    }

    /// Type-level middleware for `C` (empty if none was added).
    pub fn command_pipeline<C: Command>(&self) -> Pipeline<C, HandlerResult<C::Output>> {
        self.command_middleware
            .get(&TypeId::of::<C>())
            .and_then(|entry| entry.downcast_ref::<Pipeline<C, HandlerResult<C::Output>>>())
            .cloned()
            .unwrap_or_default()
    }

    /// Type-level middleware for `Q` (empty if none was added).
    pub fn query_pipeline<Q: Query>(&self) -> Pipeline<Q, HandlerResult<Q::Output>> {
        self.query_middleware
            .get(&TypeId::of::<Q>())
            .and_then(|entry| entry.downcast_ref::<Pipeline<Q, HandlerResult<Q::Output>>>())
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_command<C: Command>(&self) -> bool {
        self.commands.contains_key(&TypeId::of::<C>())
    }

    pub fn has_query<Q: Query>(&self) -> bool {
        self.queries.contains_key(&TypeId::of::<Q>())
    }

    /// Registered command names, sorted.
    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.names.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn routes(&self, name: &str) -> &[(TypeId, EnvelopeRoute)] {
        self.names.get(name).map_or(&[], |routes| routes.as_slice())
    }
}
