//! Error-observation sinks for handler failures.

use tracing::error;

use crate::error::HandlerError;

/// Destination for handler failures.
///
/// Reporting is fire-and-forget: implementations must not block for long, as
/// they are called from the task that ran the handler.
pub trait ErrorSink: Send + Sync + 'static {
    /// Observe one failed handler run.
    fn report(&self, error: &HandlerError);
}

/// Default sink, emits an error event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, err: &HandlerError) {
        error!(error = %err, "Handler run failed");
    }
}

impl<F> ErrorSink for F
where
    F: Fn(&HandlerError) + Send + Sync + 'static,
{
    fn report(&self, error: &HandlerError) {
        (self)(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_closure_sink_receives_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |err: &HandlerError| seen.lock().push(err.to_string())
        };

        sink.report(&HandlerError::msg("first"));
        sink.report(&HandlerError::msg("second"));

        assert_eq!(*seen.lock(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_log_sink_does_not_panic() {
        LogSink.report(&HandlerError::msg("logged"));
    }
}
