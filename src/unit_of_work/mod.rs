//! Transactional unit of work.
//!
//! [`UnitOfWork::execute`] runs a body inside a transaction obtained from the
//! [`TransactionManager`] port and retries it in a fresh transaction when it
//! fails with [`TransactionError::Retryable`]. The body receives a
//! [`UnitOfWorkScope`] for the attempt; domain events raised on the scope are
//! flushed to listeners only after the commit succeeded.
//!
//! Order on success:
//!
//! 1. body
//! 2. before-commit hooks (inside the transaction)
//! 3. commit
//! 4. flush of buffered domain events
//! 5. after-commit hooks, in registration order
//!
//! Errors in steps 4 and 5 go to the [`ErrorReporter`]; the commit stands.
//!
//! Units of work do not nest. Starting one while another is running its body
//! on the same thread fails with [`UnitOfWorkError::Nested`]; pass the
//! [`UnitOfWorkScope`] down instead. Flush and after-commit hooks run outside
//! the transaction and may start a new unit of work.

mod reporter;
mod scope;
mod transaction;

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{ConfigError, DispatchConfig};
use crate::container::Container;
use crate::events::{DeferredEventDispatcher, EventRouter, ListenerRegistry, ListenerResult};
use crate::message::DomainEvent;
use crate::pipeline::Middleware;

pub use reporter::{ErrorReporter, TracingReporter};
pub use scope::UnitOfWorkScope;
pub use transaction::{InMemoryTransactions, TransactionError, TransactionManager};

/// Errors returned by [`UnitOfWork::execute`].
#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
    #[error("attempts must be at least 1, got {0}")]
    InvalidAttempts(u32),
    #[error("unit of work failed after {attempts} attempt(s): {source}")]
    Fatal {
        attempts: u32,
        #[source]
        source: TransactionError,
    },
    #[error("transaction manager returned without running the unit of work")]
    BodyNotRun,
    #[error("a unit of work is already running on this thread")]
    Nested,
}

/// Lets a body propagate a failed unit of work with `?`, aborting its own.
impl From<UnitOfWorkError> for TransactionError {
    fn from(err: UnitOfWorkError) -> Self {
        TransactionError::Fatal(Box::new(err))
    }
}

thread_local! {
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside a unit of work until dropped.
struct ActiveGuard;

impl ActiveGuard {
    fn enter() -> Result<Self, UnitOfWorkError> {
        if ACTIVE.with(|active| active.replace(true)) {
            return Err(UnitOfWorkError::Nested);
        }
        Ok(ActiveGuard)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(false));
    }
}

/// Unit-of-work manager.
///
/// ```ignore
/// let uow = UnitOfWork::new(Arc::new(InMemoryTransactions::new()), listeners)
///     .with_default_attempts(3);
///
/// let id = uow.run(|scope| {
///     let order = orders.insert(&items)?;
///     scope.raise(OrderPlaced::new(&order));
///     Ok(order.id)
/// })?;
/// ```
#[derive(Clone)]
pub struct UnitOfWork {
    transactions: Arc<dyn TransactionManager>,
    router: EventRouter,
    reporter: Arc<dyn ErrorReporter>,
    default_attempts: u32,
    retry_delay: Duration,
}

impl UnitOfWork {
    pub fn new(
        transactions: Arc<dyn TransactionManager>,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            transactions,
            router: EventRouter::new(listeners),
            reporter: Arc::new(TracingReporter),
            default_attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Add middleware around delivery of flushed domain events.
    pub fn with_middleware(
        mut self,
        middleware: Arc<dyn Middleware<dyn DomainEvent, ListenerResult>>,
    ) -> Self {
        self.router = self.router.with_middleware(middleware);
        self
    }

    /// Container used to resolve named listeners.
    pub fn with_container(mut self, container: Arc<dyn Container>) -> Self {
        self.router = self.router.with_container(container);
        self
    }

    /// Attempts used by [`UnitOfWork::run`]. Zero is accepted here and
    /// rejected when a unit of work runs.
    pub fn with_default_attempts(mut self, attempts: u32) -> Self {
        self.default_attempts = attempts;
        self
    }

    /// Pause between a retryable failure and the next attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Apply attempts and retry delay from a validated config.
    pub fn with_config(self, config: &DispatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(self
            .with_default_attempts(config.default_attempts)
            .with_retry_delay(config.retry_delay()))
    }

    pub fn default_attempts(&self) -> u32 {
        self.default_attempts
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }

    /// [`UnitOfWork::execute`] with the default number of attempts.
    pub fn run<T, F>(&self, body: F) -> Result<T, UnitOfWorkError>
    where
        F: FnMut(&mut UnitOfWorkScope) -> Result<T, TransactionError>,
    {
        self.execute(self.default_attempts, body)
    }

    /// Run `body` transactionally, up to `attempts` times.
    ///
    /// Only [`TransactionError::Retryable`] is retried, and only while
    /// attempts remain. Every attempt gets a new transaction and a new scope;
    /// events and hooks from a failed attempt are dropped with it.
    ///
    /// Fails with [`UnitOfWorkError::Nested`] when called from inside another
    /// unit of work's body on the same thread.
    pub fn execute<T, F>(&self, attempts: u32, mut body: F) -> Result<T, UnitOfWorkError>
    where
        F: FnMut(&mut UnitOfWorkScope) -> Result<T, TransactionError>,
    {
        if attempts == 0 {
            return Err(UnitOfWorkError::InvalidAttempts(attempts));
        }
        let active = ActiveGuard::enter()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut scope = UnitOfWorkScope::new(self.router.clone(), attempt);
            let mut output = None;

            let outcome = self.transactions.execute(&mut || {
                scope.reset();
                let value = body(&mut scope)?;
                scope.run_before_commit()?;
                output = Some(value);
                Ok(())
            });

            match outcome {
                Ok(()) => {
                    let value = output.ok_or(UnitOfWorkError::BodyNotRun)?;
                    debug!(attempt, attempts, "unit of work committed");
                    drop(active);
                    self.complete(scope);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(attempt, attempts, error = %err, "unit of work failed, retrying");
                    drop(scope);
                    if !self.retry_delay.is_zero() {
                        std::thread::sleep(self.retry_delay);
                    }
                }
                Err(err) => {
                    if err.is_retryable() {
                        info!(attempts, error = %err, "unit of work retries exhausted");
                    }
                    return Err(UnitOfWorkError::Fatal {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    fn complete(&self, scope: UnitOfWorkScope) {
        let (mut events, after_commit) = scope.into_parts();

        if let Err(err) = events.flush() {
            self.reporter.report(&err);
        }

        for hook in after_commit {
            if let Err(err) = hook() {
                self.reporter.report(&*err);
            }
        }
    }
}
