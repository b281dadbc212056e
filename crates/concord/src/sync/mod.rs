//! Coordination primitives that do not depend on cancellation
//!
//! A FIFO async lock and a keyed subscription tracker.

pub mod keyed_observer;
pub mod lock;

pub use keyed_observer::{KeyedObserver, Unsubscribe};
pub use lock::{Acquire, AsyncLock, LockGuard};
