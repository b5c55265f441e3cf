//! Structured logging around dispatch.
//!
//! [`LoggingMiddleware`] is a global middleware: register it on the
//! dispatcher builder and every command and query gets a span, an entry and
//! exit line, and a warning when it fails. What goes into those lines beyond
//! the message name comes from a [`LogContextProvider`].

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, debug_span, warn};

use crate::handler::{HandlerError, HandlerResult};
use crate::message::Message;
use crate::pipeline::{Middleware, Next};

/// Supplies the key/values attached to dispatch log lines.
pub trait LogContextProvider: Send + Sync {
    fn message_context(&self, message: &dyn Message) -> Map<String, Value>;

    fn error_context(&self, error: &HandlerError) -> Map<String, Value>;
}

/// Message name plus whatever the message puts in [`Message::log_context`];
/// errors log their reason code.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLogContext;

impl LogContextProvider for DefaultLogContext {
    fn message_context(&self, message: &dyn Message) -> Map<String, Value> {
        let mut context = message.log_context();
        context.insert("message_type".into(), Value::from(message.name()));
        context
    }

    fn error_context(&self, error: &HandlerError) -> Map<String, Value> {
        let mut context = Map::new();
        context.insert("reason".into(), Value::from(error.reason().code()));
        context.insert("error".into(), Value::from(error.to_string()));
        context
    }
}

pub struct LoggingMiddleware {
    context: Arc<dyn LogContextProvider>,
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self {
            context: Arc::new(DefaultLogContext),
        }
    }
}

impl LoggingMiddleware {
    pub fn with_context(context: Arc<dyn LogContextProvider>) -> Self {
        Self { context }
    }
}

impl Middleware<dyn Message, HandlerResult<()>> for LoggingMiddleware {
    fn handle(
        &self,
        message: &dyn Message,
        next: Next<'_, dyn Message, HandlerResult<()>>,
    ) -> HandlerResult<()> {
        let span = debug_span!("dispatch", message_type = message.name());
        let _entered = span.enter();

        let context = Value::Object(self.context.message_context(message));
        debug!(context = %context, "dispatching");
        let started = Instant::now();

        let result = next(message);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => debug!(elapsed_ms, "dispatched"),
            Err(err) => {
                let error = Value::Object(self.context.error_context(err));
                warn!(elapsed_ms, context = %context, error = %error, "dispatch failed");
            }
        }
        result
    }
}
