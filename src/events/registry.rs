//! Listener registry.
//!
//! Maps an event type to the ordered listeners interested in it. Populated at
//! startup and shared read-only (behind an `Arc`) once dispatch begins.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::{EventListener, ListenerError, ListenerResult, RaisedEvents};
use crate::bus::Envelope;
use crate::container::{resolve, Container, ContainerError, Resolver};
use crate::dispatcher::{route_inbound_envelope, Dispatcher};
use crate::error::BoxError;
use crate::message::{IntegrationEvent, Message};

type ErasedListener =
    Arc<dyn Fn(&dyn Any, &mut RaisedEvents, &dyn Container) -> ListenerResult + Send + Sync>;

/// Decodes an inbound envelope into its event type and dispatches it.
pub(crate) type InboundRoute = fn(&Dispatcher, &Envelope) -> ListenerResult;

/// Ordered listeners per event type.
///
/// ```ignore
/// let listeners = ListenerRegistry::new()
///     .on(|event: &OrderPlaced, _raised| {
///         println!("order {} placed", event.order_id);
///         Ok(())
///     })
///     .named::<OrderPlaced, SendReceipt>("listeners.send_receipt")
///     .on_integration(|event: &PaymentSettled, raised| {
///         raised.raise(OrderPaid::from(event));
///         Ok(())
///     });
/// ```
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: HashMap<TypeId, Vec<ErasedListener>>,
    inbound: HashMap<&'static str, Vec<(TypeId, InboundRoute)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure listener for `E`.
    pub fn on<E, F>(self, listener: F) -> Self
    where
        E: Message,
        F: Fn(&E, &mut RaisedEvents) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.listener::<E>(Arc::new(listener))
    }

    /// Register a listener instance for `E`.
    pub fn listener<E: Message>(mut self, listener: Arc<dyn EventListener<E>>) -> Self {
        self.push::<E>(Resolver::Instance(listener));
        self
    }

    /// Register a listener resolved from the container under `name` when the
    /// first event reaches it.
    pub fn named<E, L>(mut self, name: impl Into<String>) -> Self
    where
        E: Message,
        L: EventListener<E> + 'static,
    {
        self.push::<E>(Resolver::Named {
            name: name.into(),
            resolve: Arc::new(
                |container: &dyn Container,
                 name: &str|
                 -> Result<Arc<dyn EventListener<E>>, ContainerError> {
                    let listener: Arc<dyn EventListener<E>> = resolve::<L>(container, name)?;
                    Ok(listener)
                },
            ),
        });
        self
    }

    /// Register a closure listener for an integration event and make the
    /// event decodable from inbound envelopes.
    pub fn on_integration<E, F>(self, listener: F) -> Self
    where
        E: IntegrationEvent + DeserializeOwned,
        F: Fn(&E, &mut RaisedEvents) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on::<E, F>(listener).inbound::<E>()
    }

    /// Make `E` decodable from inbound envelopes carrying its name.
    pub fn inbound<E>(mut self) -> Self
    where
        E: IntegrationEvent + DeserializeOwned,
    {
        let routes = self.inbound.entry(E::message_name()).or_default();
        if !routes.iter().any(|(id, _)| *id == TypeId::of::<E>()) {
            routes.push((TypeId::of::<E>(), route_inbound_envelope::<E>));
        }
        self
    }

    /// Number of listeners registered for `E`.
    pub fn count<E: Message>(&self) -> usize {
        self.listeners
            .get(&TypeId::of::<E>())
            .map_or(0, |listeners| listeners.len())
    }

    fn push<E: Message>(&mut self, resolver: Resolver<dyn EventListener<E>>) {
        let erased: ErasedListener = Arc::new(
            move |event: &dyn Any,
                  raised: &mut RaisedEvents,
                  container: &dyn Container|
                  -> ListenerResult {
                let Some(event) = event.downcast_ref::<E>() else {
                    return Ok(());
                };
                let listener =
                    resolver
                        .resolve(container)
                        .map_err(|source| ListenerError::Resolve {
                            name: resolver.name().unwrap_or_default().to_string(),
                            source,
                        })?;
                listener
                    .handle(event, raised)
                    .map_err(|source| ListenerError::Failed {
                        event: E::message_name(),
                        source,
                    })
            },
        );
        self.listeners
            .entry(TypeId::of::<E>())
            .or_default()
            .push(erased);
    }

    /// Notify every listener of `event`, in registration order, stopping at
    /// the first error.
    pub(crate) fn notify(
        &self,
        event: &dyn Any,
        raised: &mut RaisedEvents,
        container: &dyn Container,
    ) -> ListenerResult {
        let Some(listeners) = self.listeners.get(&event.type_id()) else {
            return Ok(());
        };
        for listener in listeners {
            listener(event, raised, container)?;
        }
        Ok(())
    }

    pub(crate) fn inbound_routes(&self, name: &str) -> &[(TypeId, InboundRoute)] {
        self.inbound.get(name).map_or(&[], |routes| routes.as_slice())
    }
}
