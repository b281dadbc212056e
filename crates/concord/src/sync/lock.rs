//! FIFO async lock
//!
//! An async mutual-exclusion lock without protected data: holding a
//! [`LockGuard`] grants exclusive access to whatever critical section the
//! callers agree on.
//!
//! # Fairness
//!
//! Requests are granted strictly in arrival order. Each request takes a
//! ticket; waiting requests sit in a `VecDeque` in ticket order and releasing
//! the lock hands it to the front of the queue.
//!
//! # Cancel Safety
//!
//! [`AsyncLock::acquire`] queues the request right away and returns an
//! [`Acquire`] future. Dropping that future before it completes removes its
//! ticket from the queue. If the lock was handed to it in the meantime the
//! grant is passed on to the next waiter, so the queue never stalls.
//!
//! # Example
//!
//! ```rust
//! use concord::sync::AsyncLock;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let lock = AsyncLock::new();
//!
//! let mut guard = lock.acquire().await.unwrap();
//! assert!(lock.is_locked());
//! guard.release();
//! assert!(!lock.is_locked());
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::core::AsyncError;

type Grant = oneshot::Sender<Result<(), AsyncError>>;

#[derive(Debug)]
struct Waiter {
    ticket: u64,
    grant: Grant,
}

#[derive(Debug, Default)]
struct LockState {
    /// Ticket of the active holder
    holder: Option<u64>,
    /// Waiters in arrival order
    waiters: VecDeque<Waiter>,
    next_ticket: u64,
    disposed: bool,
}

impl LockState {
    fn take_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    /// Release `ticket` and hand the lock to the next live waiter.
    ///
    /// Returns false, changing nothing, if `ticket` is not the holder.
    fn release(&mut self, ticket: u64) -> bool {
        if self.holder != Some(ticket) {
            return false;
        }
        self.holder = None;

        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.grant.send(Ok(())).is_ok() {
                debug!(from = ticket, to = waiter.ticket, "Lock handed over");
                self.holder = Some(waiter.ticket);
                return true;
            }
            trace!(ticket = waiter.ticket, "Skipping abandoned waiter");
        }

        trace!(ticket, "Lock released");
        true
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<LockState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An async lock with FIFO admission
///
/// Cloning the lock yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct AsyncLock {
    shared: Arc<Shared>,
}

impl AsyncLock {
    /// Create an unlocked lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while some request holds the lock
    pub fn is_locked(&self) -> bool {
        self.shared.lock().holder.is_some()
    }

    /// Number of requests waiting for the lock
    pub fn waiters(&self) -> usize {
        self.shared.lock().waiters.len()
    }

    /// Returns true once [`dispose`](AsyncLock::dispose) has been called
    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    /// Request exclusive access
    ///
    /// The request takes its place in the queue when this method is called,
    /// not when the returned future is first polled, so requests are granted
    /// in the order they were issued.
    ///
    /// # Errors
    ///
    /// The future fails with [`AsyncError::LockDisposed`] if the lock is
    /// disposed before this request is granted.
    pub fn acquire(&self) -> Acquire {
        let mut state = self.shared.lock();
        if state.disposed {
            return Acquire::new(0, self.shared.clone(), Request::Rejected);
        }

        let ticket = state.take_ticket();
        if state.holder.is_none() && state.waiters.is_empty() {
            trace!(ticket, "Lock granted immediately");
            state.holder = Some(ticket);
            return Acquire::new(ticket, self.shared.clone(), Request::Granted);
        }

        let (grant, receiver) = oneshot::channel();
        state.waiters.push_back(Waiter { ticket, grant });
        trace!(ticket, waiters = state.waiters.len(), "Lock request queued");
        Acquire::new(ticket, self.shared.clone(), Request::Queued(receiver))
    }

    /// Take the lock only if it is free and nobody is waiting
    ///
    /// # Errors
    ///
    /// Returns [`AsyncError::LockDisposed`] if the lock has been disposed.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>, AsyncError> {
        let mut state = self.shared.lock();
        if state.disposed {
            return Err(AsyncError::LockDisposed);
        }
        if state.holder.is_some() || !state.waiters.is_empty() {
            return Ok(None);
        }
        let ticket = state.take_ticket();
        state.holder = Some(ticket);
        Ok(Some(LockGuard::new(ticket, self.shared.clone())))
    }

    /// Run `op` while holding the lock
    ///
    /// The lock is requested immediately; it is released when `op` finishes
    /// or the returned future is dropped.
    pub fn exclusive<F, T>(&self, op: F) -> impl Future<Output = Result<T, AsyncError>>
    where
        F: Future<Output = T>,
    {
        let acquire = self.acquire();
        async move {
            let _guard = acquire.await?;
            Ok(op.await)
        }
    }

    /// Reject every queued request with [`AsyncError::LockDisposed`]
    ///
    /// The current holder keeps the lock until it releases it. Requests made
    /// after disposal fail immediately.
    pub fn dispose(&self) {
        let waiters = {
            let mut state = self.shared.lock();
            state.disposed = true;
            std::mem::take(&mut state.waiters)
        };

        debug!(rejected = waiters.len(), "Lock disposed");
        for waiter in waiters {
            let _ = waiter.grant.send(Err(AsyncError::LockDisposed));
        }
    }
}

enum Request {
    Granted,
    Queued(oneshot::Receiver<Result<(), AsyncError>>),
    Rejected,
}

/// Future returned by [`AsyncLock::acquire`]
///
/// Dropping it before completion withdraws the request. A grant that arrived
/// in the meantime is passed on to the next waiter.
#[must_use = "dropping an Acquire withdraws the lock request"]
pub struct Acquire {
    ticket: u64,
    shared: Arc<Shared>,
    request: Option<Request>,
}

impl Acquire {
    fn new(ticket: u64, shared: Arc<Shared>, request: Request) -> Self {
        Self {
            ticket,
            shared,
            request: Some(request),
        }
    }
}

impl Future for Acquire {
    type Output = Result<LockGuard, AsyncError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let granted = match this.request.as_mut() {
            Some(Request::Granted) => Ok(()),
            Some(Request::Rejected) => Err(AsyncError::LockDisposed),
            Some(Request::Queued(receiver)) => match Pin::new(receiver).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(granted)) => granted,
                Poll::Ready(Err(_)) => Err(AsyncError::LockDisposed),
            },
            None => panic!("Acquire polled after completion"),
        };
        this.request = None;
        Poll::Ready(granted.map(|()| LockGuard::new(this.ticket, this.shared.clone())))
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        match self.request.take() {
            None | Some(Request::Rejected) => {}
            Some(Request::Granted) | Some(Request::Queued(_)) => {
                let mut state = self.shared.lock();
                state.waiters.retain(|waiter| waiter.ticket != self.ticket);
                // Granted while nobody was polling: pass the grant on.
                state.release(self.ticket);
            }
        }
    }
}

impl fmt::Debug for Acquire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquire")
            .field("ticket", &self.ticket)
            .field("pending", &self.request.is_some())
            .finish()
    }
}

/// Exclusive access to an [`AsyncLock`]
///
/// The lock is released by [`LockGuard::release`] or when the guard is
/// dropped, whichever comes first.
#[must_use = "dropping the guard releases the lock"]
#[derive(Debug)]
pub struct LockGuard {
    ticket: u64,
    shared: Arc<Shared>,
}

impl LockGuard {
    fn new(ticket: u64, shared: Arc<Shared>) -> Self {
        Self { ticket, shared }
    }

    /// The ticket this guard was granted with
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Release the lock and wake the next waiter
    ///
    /// Returns false, without touching the queue, if this guard no longer
    /// holds the lock.
    pub fn release(&mut self) -> bool {
        self.shared.lock().release(self.ticket)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
