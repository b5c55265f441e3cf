//! Middleware pipeline.
//!
//! A [`Pipeline`] holds an ordered list of interceptors and wraps them around
//! a terminal operation: the first interceptor is the outermost. The same
//! pipeline type drives command and query dispatch, domain and inbound event
//! delivery, outbound publishing and queue pushes; only the message type `M`
//! and the output type `T` change.
//!
//! An interceptor gets the message and a [`Next`] continuation. Calling it
//! exactly once is normal delivery. Not calling it short-circuits everything
//! inside. Calling it more than once is allowed but is the interceptor's own
//! contract to document.
//!
//! Errors returned by an interceptor flow to the caller unchanged. Nothing is
//! retried here.

use std::fmt;
use std::sync::Arc;

/// Continuation handed to an interceptor.
pub type Next<'a, M, T> = &'a dyn Fn(&M) -> T;

/// An interceptor around dispatch of `M` producing `T`.
pub trait Middleware<M: ?Sized, T>: Send + Sync {
    fn handle(&self, message: &M, next: Next<'_, M, T>) -> T;
}

/// Ordered interceptors, composed by right fold over a terminal operation.
pub struct Pipeline<M: ?Sized, T> {
    middleware: Vec<Arc<dyn Middleware<M, T>>>,
}

impl<M: ?Sized, T> Default for Pipeline<M, T> {
    fn default() -> Self {
        Self {
            middleware: Vec::new(),
        }
    }
}

impl<M: ?Sized, T> Clone for Pipeline<M, T> {
    fn clone(&self) -> Self {
        Self {
            middleware: self.middleware.clone(),
        }
    }
}

impl<M: ?Sized, T> fmt::Debug for Pipeline<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

impl<M: ?Sized + 'static, T: 'static> Pipeline<M, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor (builder style).
    pub fn with(mut self, middleware: Arc<dyn Middleware<M, T>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Append an interceptor.
    pub fn push(&mut self, middleware: Arc<dyn Middleware<M, T>>) {
        self.middleware.push(middleware);
    }

    /// Append interceptors after the current ones (they run further inside).
    pub fn extend<I>(mut self, middleware: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware<M, T>>>,
    {
        self.middleware.extend(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Compose the interceptors around `terminal` into a single callable.
    pub fn build<'a, F>(&'a self, terminal: F) -> Box<dyn Fn(&M) -> T + 'a>
    where
        F: Fn(&M) -> T + 'a,
    {
        let terminal: Box<dyn Fn(&M) -> T + 'a> = Box::new(terminal);
        self.middleware
            .iter()
            .rev()
            .fold(terminal, |next, middleware| -> Box<dyn Fn(&M) -> T + 'a> {
                Box::new(move |message: &M| middleware.handle(message, &*next))
            })
    }

    /// Build and invoke in one go.
    pub fn run<F>(&self, message: &M, terminal: F) -> T
    where
        F: Fn(&M) -> T,
    {
        let composed = self.build(terminal);
        composed(message)
    }
}
