//! Change observers.

use crate::FlagValue;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// Receives flag value changes.
///
/// Called synchronously on the thread that made the change: the caller's
/// thread for a direct `set`, the watcher thread for an external edit.
/// Implementations should return quickly.
pub trait FlagObserver: Send + Sync {
    /// `old` is `None` when the flag had no value, `new` is `None` when the
    /// value disappeared (file reset).
    fn on_change(&self, flag: &str, old: Option<&FlagValue>, new: Option<&FlagValue>);
}

impl<F> FlagObserver for F
where
    F: Fn(&str, Option<&FlagValue>, Option<&FlagValue>) + Send + Sync,
{
    fn on_change(&self, flag: &str, old: Option<&FlagValue>, new: Option<&FlagValue>) {
        self(flag, old, new)
    }
}

/// Handle identifying one observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("observer#{}", _0)]
pub struct ObserverId(u64);

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

impl ObserverId {
    fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type Registration = (ObserverId, Arc<dyn FlagObserver>);

/// Observer registrations keyed by flag name.
#[derive(Default)]
pub(crate) struct ObserverSet {
    by_flag: HashMap<String, Vec<Registration>>,
}

impl ObserverSet {
    pub(crate) fn add(&mut self, flag: &str, observer: Arc<dyn FlagObserver>) -> ObserverId {
        let id = ObserverId::next();
        self.by_flag
            .entry(flag.to_string())
            .or_default()
            .push((id, observer));
        id
    }

    /// Remove one registration, or every registration on the flag when `id`
    /// is `None`. Returns how many were removed.
    pub(crate) fn remove(&mut self, flag: &str, id: Option<ObserverId>) -> usize {
        let Some(list) = self.by_flag.get_mut(flag) else {
            return 0;
        };
        let before = list.len();
        match id {
            Some(id) => list.retain(|(existing, _)| *existing != id),
            None => list.clear(),
        }
        let removed = before - list.len();
        if list.is_empty() {
            self.by_flag.remove(flag);
        }
        removed
    }

    /// Observers registered on `flag`, cloned so they can run unlocked.
    pub(crate) fn for_flag(&self, flag: &str) -> Vec<Arc<dyn FlagObserver>> {
        self.by_flag
            .get(flag)
            .map(|list| list.iter().map(|(_, o)| Arc::clone(o)).collect())
            .unwrap_or_default()
    }

    /// Flags that have at least one observer.
    pub(crate) fn observed_flags(&self) -> impl Iterator<Item = &str> {
        self.by_flag.keys().map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_flag.values().map(Vec::len).sum()
    }
}

/// One value change queued for delivery.
#[derive(Debug, Clone)]
pub(crate) struct Change {
    pub(crate) flag: String,
    pub(crate) old: Option<FlagValue>,
    pub(crate) new: Option<FlagValue>,
}

/// Invoke observers, catching and logging panics so one faulty callback
/// cannot take down the caller or starve the others.
pub(crate) fn deliver(change: &Change, observers: &[Arc<dyn FlagObserver>]) {
    for observer in observers {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            observer.on_change(&change.flag, change.old.as_ref(), change.new.as_ref())
        }));
        if outcome.is_err() {
            error!(flag = %change.flag, "Observer callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_remove_single_and_all() {
        let mut set = ObserverSet::default();
        let noop = |_: &str, _: Option<&FlagValue>, _: Option<&FlagValue>| {};
        let a = set.add("debug_mode", Arc::new(noop));
        let _b = set.add("debug_mode", Arc::new(noop));
        set.add("other", Arc::new(noop));
        assert_eq!(set.len(), 3);

        assert_eq!(set.remove("debug_mode", Some(a)), 1);
        assert_eq!(set.for_flag("debug_mode").len(), 1);
        assert_eq!(set.remove("debug_mode", None), 1);
        assert!(set.for_flag("debug_mode").is_empty());
        assert_eq!(set.observed_flags().collect::<Vec<_>>(), vec!["other"]);
        assert_eq!(set.remove("missing", None), 0);
    }

    #[test]
    fn test_panicking_observer_does_not_block_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let faulty: Arc<dyn FlagObserver> =
            Arc::new(|_: &str, _: Option<&FlagValue>, _: Option<&FlagValue>| {
                panic!("boom");
            });
        let counting: Arc<dyn FlagObserver> =
            Arc::new(move |_: &str, _: Option<&FlagValue>, _: Option<&FlagValue>| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let observers = vec![faulty, counting];
        let change = Change {
            flag: "debug_mode".to_string(),
            old: None,
            new: Some(FlagValue::Bool(true)),
        };
        deliver(&change, &observers);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
