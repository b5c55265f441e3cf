//! Message dispatch core for CQRS applications.
//!
//! - [`Dispatcher`] routes commands and queries to their single handler
//!   through a middleware [`Pipeline`], and queues commands for later.
//! - [`unit_of_work::UnitOfWork`] runs a body transactionally with retry and
//!   defers domain events until the commit succeeded.
//! - [`events`] delivers domain and inbound integration events to listeners.
//! - [`outbox`] and [`bus`] carry integration events and queued commands
//!   across the process boundary as [`bus::Envelope`]s.

pub mod bus;
pub mod events;
pub mod outbox;
pub mod unit_of_work;

mod config;
mod container;
mod dispatcher;
mod error;
mod failure;
mod handler;
mod logging;
mod message;
mod pipeline;
mod registry;
#[cfg(feature = "bus")]
mod worker;

pub use config::{ConfigError, DispatchConfig};
pub use container::{resolve, Container, ContainerError, InMemoryContainer, Resolver};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{BoxError, RegistrationError};
pub use failure::{DispatchResult, Failure, Reason};
pub use handler::{CommandHandler, HandlerError, HandlerResult, QueryHandler};
pub use logging::{DefaultLogContext, LogContextProvider, LoggingMiddleware};
pub use message::{Command, DomainEvent, IntegrationEvent, Message, MessageMeta, Query};
pub use pipeline::{Middleware, Next, Pipeline};
pub use registry::HandlerRegistry;
#[cfg(feature = "bus")]
pub use worker::{CommandWorker, InboundWorker, WorkerHandle, WorkerStats};

#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
