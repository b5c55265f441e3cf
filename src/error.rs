use std::error::Error;

/// Boxed error used for collaborator failures the core only forwards.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Errors raised while populating the handler registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// A command or query type already has a handler.
    #[error("a handler is already registered for {0}")]
    DuplicateHandler(&'static str),
}
