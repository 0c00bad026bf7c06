//! Ordered composition of handlers.

use async_trait::async_trait;
use tracing::trace;

use crate::coalesce::Handler;
use crate::error::HandlerError;

/// Runs handlers one after another, stopping at the first failure.
///
/// Typical use is a set of pre-reload callbacks (writing state, rendering
/// config) followed by the reload itself.
#[derive(Default)]
pub struct Sequence {
    steps: Vec<Box<dyn Handler>>,
}

impl Sequence {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn then<H: Handler>(mut self, step: H) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the sequence has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[async_trait]
impl Handler for Sequence {
    async fn handle(&self) -> Result<(), HandlerError> {
        for (index, step) in self.steps.iter().enumerate() {
            trace!(step = index, "Running reload step");
            step.handle().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn step(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str, fail: bool) -> impl Handler {
        let log = Arc::clone(log);
        move || {
            log.lock().push(name);
            async move {
                if fail {
                    Err(HandlerError::msg(name))
                } else {
                    Ok(())
                }
            }
        }
    }

    #[tokio::test]
    async fn test_runs_steps_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sequence = Sequence::new()
            .then(step(&log, "write_state", false))
            .then(step(&log, "write_config", false))
            .then(step(&log, "reload", false));

        assert_eq!(sequence.len(), 3);
        assert!(sequence.handle().await.is_ok());
        assert_eq!(*log.lock(), vec!["write_state", "write_config", "reload"]);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sequence = Sequence::new()
            .then(step(&log, "write_state", false))
            .then(step(&log, "write_config", true))
            .then(step(&log, "reload", false));

        let err = sequence.handle().await.unwrap_err();
        assert_eq!(err.to_string(), "write_config");
        assert_eq!(*log.lock(), vec!["write_state", "write_config"]);
    }

    #[tokio::test]
    async fn test_empty_sequence_succeeds() {
        let sequence = Sequence::new();
        assert!(sequence.is_empty());
        assert!(sequence.handle().await.is_ok());
    }
}
