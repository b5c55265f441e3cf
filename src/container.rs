//! Lazily resolved handlers and listeners.
//!
//! Handlers and listeners may be registered by name instead of by instance.
//! A named receiver is looked up in a [`Container`] the first time a message
//! reaches it, so the container itself can be wired after the registries.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Errors raised by container lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("nothing registered under {0}")]
    NotFound(String),
    #[error("{name} is not a {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },
}

/// Service container port.
pub trait Container: Send + Sync {
    fn get(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>, ContainerError>;
}

/// Look up `name` and downcast it to `T`.
pub fn resolve<T: Any + Send + Sync>(
    container: &dyn Container,
    name: &str,
) -> Result<Arc<T>, ContainerError> {
    container
        .get(name)?
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
}

/// Simple map-backed container.
#[derive(Clone, Default)]
pub struct InMemoryContainer {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl InMemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value (builder style).
    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.entries.insert(name.into(), Arc::new(value));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl Container for InMemoryContainer {
    fn get(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>, ContainerError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::NotFound(name.to_string()))
    }
}

/// Lookup function behind a named [`Resolver`].
pub type ResolveFn<T> =
    dyn Fn(&dyn Container, &str) -> Result<Arc<T>, ContainerError> + Send + Sync;

/// A receiver held either directly or as a name to resolve later.
pub enum Resolver<T: ?Sized> {
    Instance(Arc<T>),
    Named {
        name: String,
        resolve: Arc<ResolveFn<T>>,
    },
}

impl<T: ?Sized> Resolver<T> {
    pub fn resolve(&self, container: &dyn Container) -> Result<Arc<T>, ContainerError> {
        match self {
            Resolver::Instance(instance) => Ok(Arc::clone(instance)),
            Resolver::Named { name, resolve } => resolve(container, name),
        }
    }

    /// Registered name, if this receiver is resolved lazily.
    pub fn name(&self) -> Option<&str> {
        match self {
            Resolver::Instance(_) => None,
            Resolver::Named { name, .. } => Some(name),
        }
    }
}

impl<T: ?Sized> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        match self {
            Resolver::Instance(instance) => Resolver::Instance(Arc::clone(instance)),
            Resolver::Named { name, resolve } => Resolver::Named {
                name: name.clone(),
                resolve: Arc::clone(resolve),
            },
        }
    }
}

impl<T: ?Sized> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Instance(_) => f.write_str("Resolver::Instance"),
            Resolver::Named { name, .. } => write!(f, "Resolver::Named({})", name),
        }
    }
}
