//! Cancellation shared by the network and decode stages.
//!
//! The token is `tokio_util`'s: awaitable from async code, pollable from the
//! blocking decoders through [`CancellationExt::check`].

pub use tokio_util::sync::CancellationToken;

/// Error returned when an operation is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation was cancelled")
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for crate::error::LogLensError {
    fn from(_: CancelledError) -> Self {
        crate::error::LogLensError::Cancelled
    }
}

/// `?`-friendly cancellation checks for code that cannot await.
pub trait CancellationExt {
    /// Check cancellation and return an error if cancelled.
    fn check(&self) -> Result<(), CancelledError>;
}

impl CancellationExt for CancellationToken {
    fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogLensError;

    #[test]
    fn test_check_follows_token() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());

        token.cancel();
        assert_eq!(token.check(), Err(CancelledError));
    }

    #[test]
    fn test_child_cancel_leaves_parent_running() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel();
        assert!(child.check().is_err());
        assert!(parent.check().is_ok());

        let second = parent.child_token();
        parent.cancel();
        assert!(second.check().is_err());
    }

    #[test]
    fn test_cancelled_error_converts() {
        assert_eq!(CancelledError.to_string(), "Operation was cancelled");
        let err: LogLensError = CancelledError.into();
        assert!(matches!(err, LogLensError::Cancelled));
    }
}
