//! Keyed subscription tracker
//!
//! [`KeyedObserver`] keeps one live subscription per key of a changing key
//! set. Each call to [`observe`](KeyedObserver::observe) reconciles the
//! tracked keys against the new set: keys that disappeared are unsubscribed,
//! new keys are subscribed and keys present in both are left alone.
//!
//! ```rust
//! use concord::sync::{KeyedObserver, Unsubscribe};
//!
//! let mut observer = KeyedObserver::new(|key: &String| {
//!     let key = key.clone();
//!     Some(Unsubscribe::new(move || drop(key)))
//! });
//!
//! observer.observe(["a".to_string(), "b".to_string()]);
//! observer.observe(["b".to_string(), "c".to_string()]);
//! assert!(!observer.is_observing(&"a".to_string()));
//! assert_eq!(observer.len(), 2);
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use tracing::trace;

/// Capability that removes one subscription
#[must_use = "an Unsubscribe that is never called leaks its subscription"]
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    /// Wrap a function that tears down a subscription
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(unsubscribe))
    }

    /// Tear the subscription down
    pub fn call(self) {
        (self.0)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// Reconciles a key set against live subscriptions
///
/// `subscribe` is called for each newly observed key and returns the
/// capability that undoes the subscription, or `None` when there is nothing
/// to subscribe to (the key no longer resolves, for example). Keys without a
/// subscription are not tracked and will be tried again by the next
/// `observe` that includes them.
///
/// Dropping the observer unsubscribes everything.
pub struct KeyedObserver<K, S>
where
    K: Eq + Hash + Clone,
    S: FnMut(&K) -> Option<Unsubscribe>,
{
    subscribe: S,
    /// Allocated on the first non-empty observe
    observed: Option<HashMap<K, Unsubscribe>>,
}

impl<K, S> KeyedObserver<K, S>
where
    K: Eq + Hash + Clone,
    S: FnMut(&K) -> Option<Unsubscribe>,
{
    /// Create an observer that tracks nothing yet
    pub fn new(subscribe: S) -> Self {
        Self {
            subscribe,
            observed: None,
        }
    }

    /// Make the tracked keys match `keys`
    ///
    /// Duplicate keys count once. Stale keys are unsubscribed before new
    /// keys are subscribed; new keys are subscribed in input order.
    pub fn observe<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
    {
        let mut keys = keys.into_iter().peekable();
        if self.observed.is_none() && keys.peek().is_none() {
            return;
        }

        let mut desired = HashSet::new();
        let mut ordered = Vec::new();
        for key in keys {
            if desired.insert(key.clone()) {
                ordered.push(key);
            }
        }

        let observed = self.observed.get_or_insert_with(HashMap::new);

        let stale: Vec<K> = observed
            .keys()
            .filter(|key| !desired.contains(*key))
            .cloned()
            .collect();
        let unsubscribed = stale.len();
        for key in stale {
            if let Some(unsubscribe) = observed.remove(&key) {
                unsubscribe.call();
            }
        }

        let mut subscribed = 0;
        for key in ordered {
            if observed.contains_key(&key) {
                continue;
            }
            if let Some(unsubscribe) = (self.subscribe)(&key) {
                observed.insert(key, unsubscribe);
                subscribed += 1;
            }
        }

        trace!(subscribed, unsubscribed, tracked = observed.len(), "Reconciled keyed subscriptions");

        if observed.is_empty() {
            self.observed = None;
        }
    }

    /// Unsubscribe every tracked key
    pub fn stop_listening(&mut self) {
        self.observe(std::iter::empty());
    }

    /// Returns true if `key` has a live subscription
    pub fn is_observing(&self, key: &K) -> bool {
        self.observed
            .as_ref()
            .map(|observed| observed.contains_key(key))
            .unwrap_or(false)
    }

    /// Number of keys with a live subscription
    pub fn len(&self) -> usize {
        self.observed.as_ref().map(HashMap::len).unwrap_or(0)
    }

    /// Returns true if no key is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the tracked keys in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.observed.iter().flat_map(HashMap::keys)
    }
}

impl<K, S> Drop for KeyedObserver<K, S>
where
    K: Eq + Hash + Clone,
    S: FnMut(&K) -> Option<Unsubscribe>,
{
    fn drop(&mut self) {
        self.stop_listening();
    }
}

impl<K, S> fmt::Debug for KeyedObserver<K, S>
where
    K: Eq + Hash + Clone + fmt::Debug,
    S: FnMut(&K) -> Option<Unsubscribe>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedObserver")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging_observer(
        log: &Log,
    ) -> KeyedObserver<&'static str, impl FnMut(&&'static str) -> Option<Unsubscribe>> {
        let log = log.clone();
        KeyedObserver::new(move |key: &&'static str| {
            log.lock().unwrap().push(format!("+{}", key));
            let log = log.clone();
            let key = *key;
            Some(Unsubscribe::new(move || log.lock().unwrap().push(format!("-{}", key))))
        })
    }

    #[test]
    fn test_empty_observe_on_fresh_observer_is_noop() {
        let log = Log::default();
        let mut observer = logging_observer(&log);
        observer.observe([]);
        assert!(observer.observed.is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reconcile_symmetric_difference() {
        let log = Log::default();
        let mut observer = logging_observer(&log);
        observer.observe(["k1", "k2"]);
        log.lock().unwrap().clear();

        observer.observe(["k2", "k3"]);
        assert_eq!(*log.lock().unwrap(), vec!["-k1", "+k3"]);
    }

    #[test]
    fn test_duplicates_subscribe_once() {
        let log = Log::default();
        let mut observer = logging_observer(&log);
        observer.observe(["a", "a", "b", "a"]);
        assert_eq!(*log.lock().unwrap(), vec!["+a", "+b"]);
        assert_eq!(observer.len(), 2);
    }

    #[test]
    fn test_missing_backing_object_is_not_tracked() {
        let mut observer = KeyedObserver::new(|key: &u32| {
            if key % 2 == 0 {
                Some(Unsubscribe::new(|| {}))
            } else {
                None
            }
        });
        observer.observe([1, 2, 3, 4]);
        assert_eq!(observer.len(), 2);
        assert!(observer.is_observing(&2));
        assert!(!observer.is_observing(&3));
    }

    #[test]
    fn test_stop_listening_releases_everything() {
        let log = Log::default();
        let mut observer = logging_observer(&log);
        observer.observe(["x", "y"]);
        observer.stop_listening();
        assert!(observer.is_empty());
        assert!(observer.observed.is_none());

        let entries = log.lock().unwrap().clone();
        assert!(entries.contains(&"-x".to_string()));
        assert!(entries.contains(&"-y".to_string()));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let log = Log::default();
        {
            let mut observer = logging_observer(&log);
            observer.observe(["z"]);
        }
        assert_eq!(*log.lock().unwrap(), vec!["+z", "-z"]);
    }
}
