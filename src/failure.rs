//! Dispatch outcomes.
//!
//! A dispatched command or query yields a [`DispatchResult`]: `Ok(value)` on
//! success, `Err(Failure)` otherwise. Chaining with `and_then` / `map`
//! short-circuits on the first failure, and a failure never carries a value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of dispatching a command or query.
pub type DispatchResult<T> = Result<T, Failure>;

/// Reason code attached to every [`Failure`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// No handler is registered for the message type.
    HandlerNotFound,
    /// More than one handler matched a message name.
    AmbiguousHandler,
    /// A handler rejected the message.
    Validation,
    /// A queued or inbound payload could not be decoded.
    DecodeFailed,
    /// A handler raised an error that is not a failure signal.
    UnexpectedError,
    /// A unit of work inside the handler failed for good.
    Fatal,
    /// Application-defined reason code.
    Custom(String),
}

impl Reason {
    /// Stable code for logs and transports.
    pub fn code(&self) -> &str {
        match self {
            Reason::HandlerNotFound => "handler_not_found",
            Reason::AmbiguousHandler => "ambiguous_handler",
            Reason::Validation => "validation",
            Reason::DecodeFailed => "decode_failed",
            Reason::UnexpectedError => "unexpected_error",
            Reason::Fatal => "fatal",
            Reason::Custom(code) => code,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure payload: a reason code plus a human readable message.
///
/// Carries enough to rebuild an abort decision on the other side of a
/// transport, so it is serializable and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct Failure {
    pub reason: Reason,
    pub message: String,
}

impl Failure {
    pub fn new(reason: Reason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn handler_not_found(message_name: &str) -> Self {
        Self::new(
            Reason::HandlerNotFound,
            format!("no handler registered for {}", message_name),
        )
    }

    pub fn ambiguous_handler(message_name: &str, candidates: usize) -> Self {
        Self::new(
            Reason::AmbiguousHandler,
            format!("{} handlers match {}", candidates, message_name),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(Reason::Validation, message)
    }

    pub fn decode_failed(message_name: &str, error: impl fmt::Display) -> Self {
        Self::new(
            Reason::DecodeFailed,
            format!("could not decode {}: {}", message_name, error),
        )
    }

    pub fn unexpected(error: impl fmt::Display) -> Self {
        Self::new(Reason::UnexpectedError, error.to_string())
    }

    pub fn fatal(error: impl fmt::Display) -> Self {
        Self::new(Reason::Fatal, error.to_string())
    }

    pub fn custom(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Reason::Custom(code.into()), message)
    }

    /// Check the reason code.
    pub fn is(&self, reason: &Reason) -> bool {
        &self.reason == reason
    }
}
