//! Owned cancellation scopes
//!
//! An [`AbortScope`] owns a token for the duration of some piece of work.
//! Disposing the scope, explicitly or by dropping it, cancels the token and
//! detaches it from the parent it was derived from.

use tracing::trace;

use super::token::AbortToken;
use crate::core::{CancelReason, SignalState};

/// Reason recorded when a scope is disposed before being aborted
pub const DISPOSED_REASON: &str = "scope disposed";

/// A cancellation scope that aborts its token when dropped
#[derive(Debug)]
pub struct AbortScope {
    token: AbortToken,
}

impl AbortScope {
    /// Create a scope, optionally derived from a parent token
    ///
    /// A scope derived from an already cancelled parent starts out aborted.
    pub fn new(parent: Option<&AbortToken>) -> Self {
        let token = match parent {
            Some(parent) => parent.child(),
            None => AbortToken::new(),
        };
        Self { token }
    }

    /// The token governed by this scope
    pub fn token(&self) -> &AbortToken {
        &self.token
    }

    /// Snapshot of the scope's token state
    pub fn signal(&self) -> SignalState {
        self.token.signal()
    }

    /// Returns true once the scope has been aborted
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Abort without a reason
    pub fn abort(&self) -> bool {
        self.token.cancel()
    }

    /// Abort with a reason
    pub fn abort_with(&self, reason: impl Into<CancelReason>) -> bool {
        self.token.cancel_with(reason)
    }

    /// Dispose the scope, aborting it if it is still active
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for AbortScope {
    fn drop(&mut self) {
        if self.token.cancel_with(DISPOSED_REASON) {
            trace!("Scope disposed while active");
        }
    }
}
