//! Transaction execution port.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::bus::PublishError;
use crate::error::BoxError;
use crate::failure::Failure;

/// Error raised inside a transactional boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Transient; the unit of work may run again in a new transaction.
    #[error("transient failure: {0}")]
    Retryable(#[source] BoxError),
    /// Permanent; propagates without consuming remaining attempts.
    #[error("{0}")]
    Fatal(#[source] BoxError),
}

impl TransactionError {
    pub fn retryable(error: impl Into<BoxError>) -> Self {
        TransactionError::Retryable(error.into())
    }

    pub fn fatal(error: impl Into<BoxError>) -> Self {
        TransactionError::Fatal(error.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TransactionError::Retryable(_))
    }
}

/// A failure inside a unit of work aborts it for good. The payload is kept so
/// the dispatcher can surface it unchanged.
impl From<Failure> for TransactionError {
    fn from(failure: Failure) -> Self {
        TransactionError::Fatal(Box::new(failure))
    }
}

impl From<PublishError> for TransactionError {
    fn from(err: PublishError) -> Self {
        TransactionError::Fatal(Box::new(err))
    }
}

/// Runs a body inside a transactional boundary.
///
/// Implementations begin a transaction, call `body` (usually once), commit if
/// it returns `Ok` and roll back otherwise. Errors from `body` must be
/// returned as they are so the retry decision sees the original kind.
pub trait TransactionManager: Send + Sync {
    fn execute(
        &self,
        body: &mut dyn FnMut() -> Result<(), TransactionError>,
    ) -> Result<(), TransactionError>;
}

/// Transaction manager with no backing store.
///
/// Counts begins, commits and rollbacks and can be told to fail upcoming
/// commits, which makes it handy in tests and single-process setups.
#[derive(Clone, Default)]
pub struct InMemoryTransactions {
    begun: Arc<AtomicUsize>,
    committed: Arc<AtomicUsize>,
    rolled_back: Arc<AtomicUsize>,
    commit_failures: Arc<Mutex<VecDeque<TransactionError>>>,
}

impl InMemoryTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with `error` (queued, one per commit).
    pub fn fail_next_commit(&self, error: TransactionError) {
        self.commit_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }
}

impl TransactionManager for InMemoryTransactions {
    fn execute(
        &self,
        body: &mut dyn FnMut() -> Result<(), TransactionError>,
    ) -> Result<(), TransactionError> {
        self.begun.fetch_add(1, Ordering::SeqCst);

        if let Err(err) = body() {
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
            return Err(err);
        }

        let scripted = self
            .commit_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match scripted {
            Some(err) => {
                self.rolled_back.fetch_add(1, Ordering::SeqCst);
                Err(err)
            }
            None => {
                self.committed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}
