//! Core type definitions shared by the cancellation and scheduling layers
//!
//! This module contains the small value types that cross module boundaries:
//! why a token was cancelled and the observable state of a token.

use std::fmt;
use std::sync::Arc;

/// Why a token was cancelled
///
/// A token cancelled without an explicit reason carries [`CancelReason::Requested`].
/// Derived tokens cancelled by their parent inherit the parent's reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum CancelReason {
    /// Cancellation was requested without a reason
    #[default]
    Requested,
    /// Cancellation carries a caller-supplied message
    Message(Arc<str>),
}

impl CancelReason {
    /// Create a reason from a message
    pub fn message(message: impl Into<Arc<str>>) -> Self {
        CancelReason::Message(message.into())
    }

    /// Returns the caller-supplied message, if any
    pub fn as_message(&self) -> Option<&str> {
        match self {
            CancelReason::Requested => None,
            CancelReason::Message(message) => Some(message),
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "cancellation requested"),
            CancelReason::Message(message) => write!(f, "{}", message),
        }
    }
}

impl From<&str> for CancelReason {
    fn from(value: &str) -> Self {
        CancelReason::message(value)
    }
}

impl From<String> for CancelReason {
    fn from(value: String) -> Self {
        CancelReason::message(value)
    }
}

/// Snapshot of a token's state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignalState {
    /// Whether the token has been cancelled
    pub cancelled: bool,
    /// The cancellation reason, present once cancelled
    pub reason: Option<CancelReason>,
}

impl SignalState {
    /// State of a token that has not been cancelled
    pub fn active() -> Self {
        Self::default()
    }

    /// State of a cancelled token
    pub fn cancelled(reason: CancelReason) -> Self {
        Self {
            cancelled: true,
            reason: Some(reason),
        }
    }
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) if self.cancelled => write!(f, "cancelled ({})", reason),
            _ => write!(f, "active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_reason_display() {
        assert_eq!(CancelReason::Requested.to_string(), "cancellation requested");
        assert_eq!(CancelReason::from("unmounted").to_string(), "unmounted");
    }

    #[test]
    fn test_cancel_reason_message() {
        assert_eq!(CancelReason::Requested.as_message(), None);
        assert_eq!(
            CancelReason::from(String::from("search closed")).as_message(),
            Some("search closed")
        );
    }

    #[test]
    fn test_signal_state_display() {
        assert_eq!(SignalState::active().to_string(), "active");
        let state = SignalState::cancelled(CancelReason::from("done"));
        assert!(state.cancelled);
        assert_eq!(state.to_string(), "cancelled (done)");
    }
}
