use std::fmt;

use crate::error::BoxError;
use crate::events::{DeferredDispatcher, DeferredEventDispatcher, EventRouter};
use crate::message::DomainEvent;

use super::TransactionError;

type BeforeCommit = Box<dyn FnOnce() -> Result<(), TransactionError>>;
type AfterCommit = Box<dyn FnOnce() -> Result<(), BoxError>>;

/// Handle on the unit of work currently running.
///
/// One scope exists per attempt. Domain events raised on it are buffered and
/// only reach listeners after commit; hooks registered on it run around that
/// commit. A failed attempt drops the scope, so nothing from it leaks into
/// the next attempt or into another unit of work.
pub struct UnitOfWorkScope {
    events: DeferredDispatcher,
    before_commit: Vec<BeforeCommit>,
    after_commit: Vec<AfterCommit>,
    attempt: u32,
}

impl fmt::Debug for UnitOfWorkScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWorkScope")
            .field("attempt", &self.attempt)
            .field("pending_events", &self.events.pending())
            .field("before_commit", &self.before_commit.len())
            .field("after_commit", &self.after_commit.len())
            .finish()
    }
}

impl UnitOfWorkScope {
    pub(crate) fn new(router: EventRouter, attempt: u32) -> Self {
        Self {
            events: DeferredDispatcher::new(router),
            before_commit: Vec::new(),
            after_commit: Vec::new(),
            attempt,
        }
    }

    /// Buffer a domain event until the unit of work commits.
    pub fn raise<E: DomainEvent>(&mut self, event: E) {
        self.events.raise(event);
    }

    /// Run `hook` inside the transaction, after the body returned. An error
    /// aborts the commit like a body error would.
    pub fn before_commit<F>(&mut self, hook: F)
    where
        F: FnOnce() -> Result<(), TransactionError> + 'static,
    {
        self.before_commit.push(Box::new(hook));
    }

    /// Run `hook` once the transaction has committed, after buffered domain
    /// events are flushed. Errors are reported, never returned.
    pub fn after_commit<F>(&mut self, hook: F)
    where
        F: FnOnce() -> Result<(), BoxError> + 'static,
    {
        self.after_commit.push(Box::new(hook));
    }

    /// Discard the domain events buffered so far.
    pub fn forget_events(&mut self) {
        self.events.forget();
    }

    pub fn pending_events(&self) -> usize {
        self.events.pending()
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The deferred dispatcher behind this scope.
    pub fn events_mut(&mut self) -> &mut DeferredDispatcher {
        &mut self.events
    }

    /// Start over inside the same attempt (a transaction manager may run the
    /// body more than once).
    pub(crate) fn reset(&mut self) {
        self.events.forget();
        self.before_commit.clear();
        self.after_commit.clear();
    }

    pub(crate) fn run_before_commit(&mut self) -> Result<(), TransactionError> {
        for hook in std::mem::take(&mut self.before_commit) {
            hook()?;
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (DeferredDispatcher, Vec<AfterCommit>) {
        (self.events, self.after_commit)
    }
}
