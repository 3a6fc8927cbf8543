//! Span helpers for security operations.

use tracing::{info_span, Span};

/// Span wrapping one facade operation on behalf of a user.
pub fn security_span(operation: &'static str, user: &str, project: &str) -> Span {
    info_span!("security_op", op = operation, user = %user, project = %project, error = tracing::field::Empty)
}

/// Span for a lock table persistence run.
pub fn lock_store_span(operation: &'static str, target: &str) -> Span {
    info_span!("lock_store", op = operation, target = %target)
}

/// Record an error on the given span.
pub fn record_error(span: &Span, error: &dyn std::error::Error) {
    span.record("error", tracing::field::display(error));
}

/// Timing utility for operations.
pub struct Timer {
    start: std::time::Instant,
    operation: &'static str,
}

impl Timer {
    /// Start a new timer.
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    /// Complete the timer and record duration.
    pub fn finish(self) {
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = %self.operation,
            duration_ms = %duration.as_millis(),
            "operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::EnvFilter;

    fn with_subscriber<F>(f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let subscriber = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(EnvFilter::new("trace"))
            .finish();

        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn test_span_nesting() {
        with_subscriber(|| {
            let op = security_span("delete_resource", "/alice", "Offline");
            let _op_guard = op.enter();
            let store = lock_store_span("write", "/tmp/locks.json");
            let _store_guard = store.enter();
            tracing::info!("nested operation");
        });
    }

    #[test]
    fn test_error_recording() {
        with_subscriber(|| {
            let span = security_span("lock_resource", "/bob", "Offline");
            let error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
            record_error(&span, &error);
        });
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start("test_operation");
        std::thread::sleep(std::time::Duration::from_millis(5));
        timer.finish();
    }
}
