//! Transport ports.
//!
//! Queued commands and integration events leave the process as
//! [`Envelope`]s. The core only talks to the ports below; broker adapters
//! live outside this crate.
//!
//! ```text
//!  queue_command ──► Sender::send(queue, envelope)   ─┐
//!                                                     │  point-to-point
//!  CommandWorker ◄── Listener::listen(queue, timeout) ◄┘
//!
//!  OutboundPublisher ──► Publisher::publish(envelope) ─┐
//!                                                      │  fan-out
//!  InboundWorker ◄── Subscriber::poll / ack / nack     ◄┘
//! ```
//!
//! [`InMemoryQueue`] implements all four for tests and single-process use.

mod envelope;
mod in_memory_queue;
mod listener;
mod publisher;
mod sender;
mod subscriber;

pub use envelope::{Encoding, Envelope, CONTENT_TYPE};
pub use in_memory_queue::InMemoryQueue;
pub use listener::Listener;
pub use publisher::{PublishError, Publisher};
pub use sender::Sender;
pub use subscriber::Subscriber;
