//! Concord - cooperative cancellation and coordination for async Rust
//!
//! A small toolkit of coordination primitives for interactive applications:
//! cancellation tokens threaded through long-running work, cancellable
//! timers, a happy-eyeballs scheduler, a FIFO async lock and a keyed
//! subscription tracker.
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use concord::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let scope = AbortScope::new(None);
//! let token = scope.token().clone();
//!
//! token.cancel_with("form closed");
//! let error = delay(Duration::from_secs(1), Some(&token)).await.unwrap_err();
//! assert!(error.is_cancelled());
//! # }
//! ```
//!
//! # Layout
//!
//! - [`abort`]: tokens, scopes, `delay`, `race_with_token`, `race_happy_eyes`
//! - [`sync`]: `AsyncLock` and `KeyedObserver`
//! - [`core`]: errors, configuration and logging setup

pub mod abort;
pub mod core;
pub mod sync;

pub use crate::core::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::abort::{
        delay, expire, map_cancelled_to_none, race_happy_eyes, race_with_token, with_timeout,
        AbortScope, AbortToken, Registration,
    };
    pub use crate::core::{AsyncError, CancelReason, ErrorKind, HappyEyesConfig, SignalState};
    pub use crate::sync::{Acquire, AsyncLock, KeyedObserver, LockGuard, Unsubscribe};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_exports() {
        let token = AbortToken::new();
        assert_eq!(token.signal(), SignalState::active());
        assert_eq!(HappyEyesConfig::default(), crate::HappyEyesConfig::default());
    }
}
