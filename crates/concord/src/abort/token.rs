//! Cooperative cancellation tokens
//!
//! An [`AbortToken`] is a shared handle to a one-shot cancellation flag with an
//! ordered list of listeners. Tokens derived with [`AbortToken::child`] are
//! cancelled together with their parent but never cancel it back.
//!
//! ```text
//! root ──cancel──▶ child ──cancel──▶ grandchild
//!   ▲                │
//!   └── weak link ───┘   (child keeps the registration, parent keeps a Weak)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::oneshot;
use tracing::trace;

use crate::core::{AsyncError, CancelReason, SignalState};

type Listener = Box<dyn FnOnce(&CancelReason) + Send>;

struct TokenState {
    reason: Option<CancelReason>,
    /// Keyed by registration order
    listeners: BTreeMap<u64, Listener>,
    next_listener: u64,
    /// Listener on the parent token; released once this token is cancelled
    parent: Option<Registration>,
}

struct TokenInner {
    state: Mutex<TokenState>,
}

impl TokenInner {
    fn new() -> Self {
        Self {
            state: Mutex::new(TokenState {
                reason: None,
                listeners: BTreeMap::new(),
                next_listener: 0,
                parent: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false if the token was already cancelled
    fn cancel(&self, reason: CancelReason) -> bool {
        let (listeners, parent) = {
            let mut state = self.lock();
            if state.reason.is_some() {
                return false;
            }
            state.reason = Some(reason.clone());
            (std::mem::take(&mut state.listeners), state.parent.take())
        };

        drop(parent);

        trace!(listeners = listeners.len(), %reason, "Token cancelled");
        for (_, listener) in listeners {
            listener(&reason);
        }
        true
    }
}

/// Handle that keeps a cancellation listener registered
///
/// Dropping the handle (or calling [`Registration::unregister`]) removes the
/// listener. Removing a listener that already ran, or one registered on a
/// token that no longer exists, does nothing.
#[must_use = "dropping a Registration removes its listener"]
pub struct Registration {
    token: Weak<TokenInner>,
    id: Option<u64>,
}

impl Registration {
    fn inert() -> Self {
        Self {
            token: Weak::new(),
            id: None,
        }
    }

    /// Remove the listener now
    pub fn unregister(mut self) {
        self.release();
    }

    /// Returns true while the listener is still waiting to run
    pub fn is_pending(&self) -> bool {
        match (self.id, self.token.upgrade()) {
            (Some(id), Some(inner)) => inner.lock().listeners.contains_key(&id),
            _ => false,
        }
    }

    fn release(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(inner) = self.token.upgrade() {
            let removed = inner.lock().listeners.remove(&id);
            drop(removed);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// A cooperative cancellation token
///
/// Cloning a token yields another handle to the same flag. Cancellation is
/// permanent: the first [`cancel`](AbortToken::cancel) wins, later calls are
/// no-ops, and listeners run exactly once, synchronously and in the order
/// they were registered.
#[derive(Clone)]
pub struct AbortToken {
    inner: Arc<TokenInner>,
}

impl AbortToken {
    /// Create a new token that is not cancelled
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner::new()),
        }
    }

    /// Derive a child token
    ///
    /// The child is cancelled, with the same reason, when this token is
    /// cancelled. If this token is already cancelled the child starts out
    /// cancelled. Cancelling the child leaves this token untouched and
    /// releases the child's listener on this token.
    pub fn child(&self) -> AbortToken {
        let child = AbortToken::new();
        let weak = Arc::downgrade(&child.inner);
        let registration = self.on_cancel(move |reason| {
            if let Some(inner) = weak.upgrade() {
                inner.cancel(reason.clone());
            }
        });

        let leftover = {
            let mut state = child.inner.lock();
            if state.reason.is_none() {
                state.parent = Some(registration);
                None
            } else {
                Some(registration)
            }
        };
        drop(leftover);

        child
    }

    /// Returns true once the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().reason.is_some()
    }

    /// The cancellation reason, if cancelled
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.lock().reason.clone()
    }

    /// Snapshot of the token state
    pub fn signal(&self) -> SignalState {
        match self.reason() {
            Some(reason) => SignalState::cancelled(reason),
            None => SignalState::active(),
        }
    }

    /// Cancel without a reason
    ///
    /// Returns false if the token was already cancelled.
    pub fn cancel(&self) -> bool {
        self.inner.cancel(CancelReason::Requested)
    }

    /// Cancel with a reason
    ///
    /// Returns false if the token was already cancelled; the original reason
    /// is kept in that case.
    pub fn cancel_with(&self, reason: impl Into<CancelReason>) -> bool {
        self.inner.cancel(reason.into())
    }

    /// Register a listener to run when the token is cancelled
    ///
    /// If the token is already cancelled the listener runs immediately and
    /// the returned registration is inert.
    pub fn on_cancel<F>(&self, listener: F) -> Registration
    where
        F: FnOnce(&CancelReason) + Send + 'static,
    {
        let mut state = self.inner.lock();
        if let Some(reason) = state.reason.clone() {
            drop(state);
            listener(&reason);
            return Registration::inert();
        }

        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.insert(id, Box::new(listener));

        Registration {
            token: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Wait until the token is cancelled, yielding the reason
    ///
    /// The listener backing this future is removed when the future is dropped.
    pub async fn cancelled(&self) -> CancelReason {
        let (sender, receiver) = oneshot::channel();
        let _registration = self.on_cancel(move |reason| {
            let _ = sender.send(reason.clone());
        });

        match receiver.await {
            Ok(reason) => reason,
            // The listener lives as long as the token it is registered on.
            Err(_) => std::future::pending().await,
        }
    }

    /// Fail with [`AsyncError::Cancelled`] if the token is cancelled
    pub fn check(&self) -> Result<(), AsyncError> {
        match self.reason() {
            Some(reason) => Err(AsyncError::cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Number of listeners still waiting for cancellation
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

impl Default for AbortToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AbortToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortToken")
            .field("signal", &self.signal())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (Arc<StdMutex<Vec<String>>>, impl Fn(&str) -> Listener) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &str| -> Listener {
            let log = log_clone.clone();
            let name = name.to_string();
            Box::new(move |reason: &CancelReason| {
                log.lock().unwrap().push(format!("{}:{}", name, reason));
            })
        };
        (log, make)
    }

    #[test]
    fn test_new_token_is_active() {
        let token = AbortToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.signal(), SignalState::active());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = AbortToken::new();
        assert!(token.cancel_with("first"));
        assert!(!token.cancel_with("second"));
        assert!(!token.cancel());
        assert_eq!(token.reason(), Some(CancelReason::from("first")));
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let (log, make) = recorder();
        let token = AbortToken::new();
        let _a = token.on_cancel(make("a"));
        let _b = token.on_cancel(make("b"));
        let _c = token.on_cancel(make("c"));

        token.cancel_with("stop");
        token.cancel_with("again");

        assert_eq!(*log.lock().unwrap(), vec!["a:stop", "b:stop", "c:stop"]);
        assert_eq!(token.listener_count(), 0);
    }

    #[test]
    fn test_dropped_registration_does_not_run() {
        let (log, make) = recorder();
        let token = AbortToken::new();
        let kept = token.on_cancel(make("kept"));
        token.on_cancel(make("dropped")).unregister();
        assert_eq!(token.listener_count(), 1);

        token.cancel();
        assert_eq!(*log.lock().unwrap(), vec!["kept:cancellation requested"]);
        assert!(!kept.is_pending());
        kept.unregister();
    }

    #[test]
    fn test_register_after_cancel_runs_immediately() {
        let (log, make) = recorder();
        let token = AbortToken::new();
        token.cancel_with("late");
        let registration = token.on_cancel(make("x"));
        assert!(!registration.is_pending());
        assert_eq!(*log.lock().unwrap(), vec!["x:late"]);
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = AbortToken::new();
        let child = parent.child();
        assert_eq!(parent.listener_count(), 1);

        parent.cancel_with("parent gone");
        assert!(child.is_cancelled());
        assert_eq!(child.reason(), Some(CancelReason::from("parent gone")));
    }

    #[test]
    fn test_child_cancel_releases_parent_listener() {
        let parent = AbortToken::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
        assert_eq!(parent.listener_count(), 0);
    }

    #[test]
    fn test_dropped_child_releases_parent_listener() {
        let parent = AbortToken::new();
        let child = parent.child();
        assert_eq!(parent.listener_count(), 1);
        drop(child);
        assert_eq!(parent.listener_count(), 0);
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let parent = AbortToken::new();
        parent.cancel_with("already");
        let child = parent.child();
        assert!(child.is_cancelled());
        assert_eq!(child.reason(), Some(CancelReason::from("already")));
    }

    #[test]
    fn test_grandchild_cascade() {
        let root = AbortToken::new();
        let child = root.child();
        let grandchild = child.child();
        root.cancel();
        assert!(grandchild.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let token = AbortToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        token.cancel_with("done");
        assert_eq!(handle.await.unwrap(), CancelReason::from("done"));
        assert_eq!(token.listener_count(), 0);
    }
}
