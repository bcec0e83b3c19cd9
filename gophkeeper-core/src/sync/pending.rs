//! Keys waiting to be pushed to the server.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

#[derive(Default)]
struct Inner {
    keys: HashMap<String, Option<DateTime<Utc>>>,
    count: usize,
}

/// Set of record keys with a local change not yet confirmed by the server.
///
/// Each key remembers the `updated_at` it was queued with. A confirmation
/// only clears the key when it carries that same value, so a save that
/// lands while a sync for an older version is in flight stays queued.
#[derive(Default)]
pub struct PendingSet {
    inner: Mutex<Inner>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the map consistent.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Queue a key, replacing any older queued timestamp.
    pub fn insert(&self, key: &str, updated_at: Option<DateTime<Utc>>) {
        let mut inner = self.lock();
        if inner.keys.insert(key.to_string(), updated_at).is_none() {
            inner.count += 1;
        }
    }

    /// Clear `key` if it is still queued with exactly `updated_at`.
    ///
    /// Returns whether the key was removed.
    pub fn confirm(&self, key: &str, updated_at: Option<DateTime<Utc>>) -> bool {
        let mut inner = self.lock();
        match inner.keys.get(key) {
            Some(queued) if *queued == updated_at => {
                inner.keys.remove(key);
                inner.count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Drop a key regardless of its queued timestamp.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.lock();
        if inner.keys.remove(key).is_some() {
            inner.count -= 1;
            true
        } else {
            false
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the queued keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn insert_counts_distinct_keys() {
        let set = PendingSet::new();
        set.insert("a", Some(t(1)));
        set.insert("a", Some(t(2)));
        set.insert("b", None);
        assert_eq!(set.len(), 2);
        assert_eq!(set.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn confirm_requires_equal_timestamp() {
        let set = PendingSet::new();
        set.insert("a", Some(t(2)));

        assert!(!set.confirm("a", Some(t(1))));
        assert!(set.contains("a"));

        // Equal value, distinct instance.
        let same = Utc.timestamp_opt(2, 0).unwrap();
        assert!(set.confirm("a", Some(same)));
        assert!(set.is_empty());
    }

    #[test]
    fn confirm_none_matches_none() {
        let set = PendingSet::new();
        set.insert("a", None);
        assert!(!set.confirm("a", Some(t(1))));
        assert!(set.confirm("a", None));
        assert!(!set.confirm("a", None));
    }

    #[test]
    fn remove_ignores_timestamp() {
        let set = PendingSet::new();
        set.insert("a", Some(t(5)));
        assert!(set.remove("a"));
        assert!(!set.remove("a"));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn concurrent_inserts() {
        let set = std::sync::Arc::new(PendingSet::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let set = set.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        set.insert(&format!("k{}", (i * 50 + j) % 100), Some(t(j)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(set.len(), 100);
    }
}
