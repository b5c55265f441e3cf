//! Message kinds routed by the dispatcher.
//!
//! Every message is immutable once built and identified structurally. The
//! four kinds differ only in how they are routed:
//!
//! - [`Command`]: exactly one handler, may be queued.
//! - [`Query`]: exactly one handler, never queued.
//! - [`DomainEvent`]: zero or more listeners, deferred until commit.
//! - [`IntegrationEvent`]: crosses the process boundary through the outbox.
//!
//! Each kind may declare its own middleware; it runs inside the middleware
//! registered for its pipeline.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::events::ListenerResult;
use crate::handler::HandlerResult;
use crate::pipeline::Middleware;

/// Base trait for everything the dispatcher routes.
///
/// ```ignore
/// #[derive(Debug, Serialize, Deserialize)]
/// struct CreateOrder { items: Vec<String> }
///
/// impl Message for CreateOrder {
///     fn message_name() -> &'static str { "order.create" }
/// }
/// ```
pub trait Message: MessageMeta + Debug + Send + Sync + 'static {
    /// Routing name. Defaults to the Rust type name; override it when the
    /// name travels over a queue and must stay stable.
    fn message_name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }

    /// Extra key/values for log lines about this message.
    fn log_context(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// Object-safe accessors implemented for every [`Message`].
pub trait MessageMeta {
    fn name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Message> MessageMeta for T {
    fn name(&self) -> &'static str {
        T::message_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An intent to change state.
pub trait Command: Message + Serialize + DeserializeOwned {
    type Output: Send + 'static;

    fn middleware(&self) -> Vec<Arc<dyn Middleware<Self, HandlerResult<Self::Output>>>>
    where
        Self: Sized,
    {
        Vec::new()
    }
}

/// An intent to read state. Handlers must not mutate anything.
pub trait Query: Message {
    type Output: Send + 'static;

    fn middleware(&self) -> Vec<Arc<dyn Middleware<Self, HandlerResult<Self::Output>>>>
    where
        Self: Sized,
    {
        Vec::new()
    }
}

/// An in-process notification of a state change.
pub trait DomainEvent: Message {
    fn occurred_at(&self) -> DateTime<Utc>;

    fn middleware(&self) -> Vec<Arc<dyn Middleware<dyn DomainEvent, ListenerResult>>> {
        Vec::new()
    }
}

/// A notification that crosses a process or service boundary.
pub trait IntegrationEvent: Message {
    fn event_id(&self) -> &str;

    fn occurred_at(&self) -> DateTime<Utc>;

    fn middleware(&self) -> Vec<Arc<dyn Middleware<dyn IntegrationEvent, ListenerResult>>> {
        Vec::new()
    }
}
