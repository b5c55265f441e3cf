use std::error::Error;

use tracing::error;

/// Receives errors that happen after the point where they could still be
/// returned to a caller: after-commit hooks, event flushes, queue pushes.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &(dyn Error + 'static));
}

/// Reports through `tracing` at error level, with the source chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, err: &(dyn Error + 'static)) {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        error!(error = %err, causes = ?causes, "error reported out of band");
    }
}
