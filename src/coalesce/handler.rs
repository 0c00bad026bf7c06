//! Handler trait for the unit of work a limiter serializes.

use std::future::Future;

use async_trait::async_trait;

use crate::error::HandlerError;

/// The work run by a [`CoalescingLimiter`](super::CoalescingLimiter).
///
/// A handler takes no arguments: it is expected to read live state at the
/// moment it runs rather than a snapshot captured when the change was
/// registered.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Perform the work once.
    async fn handle(&self) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self) -> Result<(), HandlerError> {
        (self)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_handler() {
        let ok = || async { Ok::<(), HandlerError>(()) };
        assert!(ok.handle().await.is_ok());

        let failing = || async { Err::<(), _>(HandlerError::msg("nope")) };
        let err = failing.handle().await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
