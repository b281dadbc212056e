//! Core error types for async coordination
//!
//! Every deferred result produced by this crate fails with an [`AsyncError`].
//! The variant tells the caller which primitive gave up and why.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::types::CancelReason;

/// Core error types for cancellation, timing, locking and racing
#[derive(Error, Debug)]
pub enum AsyncError {
    #[error("Operation cancelled: {reason}")]
    Cancelled { reason: CancelReason },

    #[error("Timeout exceeded after {}ms", .timeout.as_millis())]
    TimeoutExceeded { timeout: Duration },

    #[error("Lock disposed while waiting")]
    LockDisposed,

    #[error("No variants left: all {attempts} attempts failed")]
    AllAttemptsExhausted {
        attempts: usize,
        failures: Vec<anyhow::Error>,
    },
}

/// Discriminant of an [`AsyncError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Cancelled,
    TimeoutExceeded,
    LockDisposed,
    AllAttemptsExhausted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::TimeoutExceeded => write!(f, "timeout"),
            ErrorKind::LockDisposed => write!(f, "disposed"),
            ErrorKind::AllAttemptsExhausted => write!(f, "exhausted"),
        }
    }
}

impl AsyncError {
    /// Create a new cancellation error
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled { reason }
    }

    /// Create a new timeout error
    pub fn timeout(timeout: Duration) -> Self {
        Self::TimeoutExceeded { timeout }
    }

    /// Create a new exhaustion error from the collected attempt failures
    pub fn exhausted(failures: Vec<anyhow::Error>) -> Self {
        Self::AllAttemptsExhausted {
            attempts: failures.len(),
            failures,
        }
    }

    /// Get the discriminant of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AsyncError::Cancelled { .. } => ErrorKind::Cancelled,
            AsyncError::TimeoutExceeded { .. } => ErrorKind::TimeoutExceeded,
            AsyncError::LockDisposed => ErrorKind::LockDisposed,
            AsyncError::AllAttemptsExhausted { .. } => ErrorKind::AllAttemptsExhausted,
        }
    }

    /// Returns true if this error reports a cancellation
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Returns true if this error reports an elapsed timeout
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::TimeoutExceeded
    }

    /// Returns the cancellation reason for [`AsyncError::Cancelled`]
    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        match self {
            AsyncError::Cancelled { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Returns true if `error` wraps a cancellation [`AsyncError`]
///
/// Useful for attempt failures and other `anyhow` chains where a cancelled
/// operation should not be reported as a real failure.
pub fn is_cancelled_error(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<AsyncError>()
        .map(AsyncError::is_cancelled)
        .unwrap_or(false)
}
