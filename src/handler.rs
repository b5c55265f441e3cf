//! Command and query handlers.

use crate::error::BoxError;
use crate::failure::{Failure, Reason};
use crate::message::{Command, Query};
use crate::unit_of_work::{TransactionError, UnitOfWorkError};

/// What a handler (or a middleware around it) returns.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Error side of a handler call.
///
/// The dispatcher turns every variant into a [`Failure`]:
/// `Failed` and `Abort` surface their payload unchanged, `Unexpected` becomes
/// `UnexpectedError`, and `Infrastructure` becomes `Fatal`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler rejected the message; the failure travels as data.
    #[error("{0}")]
    Failed(Failure),
    /// Abort-on-failure signal. `?` on a `Result<_, Failure>` anywhere down
    /// the call chain produces this; the payload is re-surfaced as-is.
    #[error("aborted with {0}")]
    Abort(Failure),
    /// Anything the handler did not expect.
    #[error("unexpected error: {0}")]
    Unexpected(#[source] BoxError),
    /// A unit of work run by the handler gave up.
    #[error("unit of work failed: {0}")]
    Infrastructure(#[source] UnitOfWorkError),
}

impl HandlerError {
    pub fn fail(failure: Failure) -> Self {
        HandlerError::Failed(failure)
    }

    pub fn unexpected(error: impl Into<BoxError>) -> Self {
        HandlerError::Unexpected(error.into())
    }

    /// Reason code this error will surface with.
    pub fn reason(&self) -> Reason {
        match self {
            HandlerError::Failed(failure) | HandlerError::Abort(failure) => failure.reason.clone(),
            HandlerError::Unexpected(_) => Reason::UnexpectedError,
            HandlerError::Infrastructure(_) => Reason::Fatal,
        }
    }

    /// The failure this error maps to at the dispatch boundary.
    pub fn into_failure(self) -> Failure {
        match self {
            HandlerError::Failed(failure) | HandlerError::Abort(failure) => failure,
            HandlerError::Unexpected(err) => Failure::unexpected(err),
            HandlerError::Infrastructure(err) => Failure::fatal(err),
        }
    }
}

impl From<Failure> for HandlerError {
    fn from(failure: Failure) -> Self {
        HandlerError::Abort(failure)
    }
}

impl From<UnitOfWorkError> for HandlerError {
    /// A unit of work aborted by a [`Failure`] keeps that failure; every
    /// other unit-of-work error is infrastructure.
    fn from(err: UnitOfWorkError) -> Self {
        match err {
            UnitOfWorkError::Fatal {
                attempts,
                source: TransactionError::Fatal(inner),
            } => match inner.downcast::<Failure>() {
                Ok(failure) => HandlerError::Abort(*failure),
                Err(inner) => HandlerError::Infrastructure(UnitOfWorkError::Fatal {
                    attempts,
                    source: TransactionError::Fatal(inner),
                }),
            },
            other => HandlerError::Infrastructure(other),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Unexpected(Box::new(err))
    }
}

/// Handles one command type.
pub trait CommandHandler<C: Command>: Send + Sync {
    fn handle(&self, command: &C) -> HandlerResult<C::Output>;
}

impl<C, F> CommandHandler<C> for F
where
    C: Command,
    F: Fn(&C) -> HandlerResult<C::Output> + Send + Sync,
{
    fn handle(&self, command: &C) -> HandlerResult<C::Output> {
        self(command)
    }
}

/// Handles one query type.
pub trait QueryHandler<Q: Query>: Send + Sync {
    fn handle(&self, query: &Q) -> HandlerResult<Q::Output>;
}

impl<Q, F> QueryHandler<Q> for F
where
    Q: Query,
    F: Fn(&Q) -> HandlerResult<Q::Output> + Send + Sync,
{
    fn handle(&self, query: &Q) -> HandlerResult<Q::Output> {
        self(query)
    }
}
