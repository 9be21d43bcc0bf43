//! Versions that increase per key across multi-key writes.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

/// Issues a version for a set of keys that is newer than any version
/// previously issued for any of them.
#[derive(Debug)]
pub struct VersionCounter<K> {
    initial_version: u64,
    versions: Mutex<HashMap<K, u64>>,
}

impl<K: Eq + Hash + Clone> VersionCounter<K> {
    pub fn new(initial_version: u64) -> Self {
        Self {
            initial_version,
            versions: Mutex::new(HashMap::new()),
        }
    }

    /// Next version for `keys`, recorded for all of them.
    ///
    /// A key never seen before counts as `initial_version - 1`, so the first
    /// version issued is `initial_version`. Fails without recording anything
    /// if a key already holds `u64::MAX`.
    pub fn next_version<'a, I>(&self, keys: I) -> Result<u64>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let keys: Vec<&K> = keys.into_iter().collect();
        let mut versions = self.versions.lock();
        let mut next = None;
        for key in &keys {
            let candidate = match versions.get(*key) {
                Some(&version) => version.checked_add(1).ok_or(Error::VersionExhausted(version))?,
                None => self.initial_version,
            };
            next = Some(next.map_or(candidate, |n: u64| n.max(candidate)));
        }
        let next = next.unwrap_or(self.initial_version);
        for key in keys {
            versions.insert(key.clone(), next);
        }
        Ok(next)
    }

    /// Last version issued for a key.
    pub fn current(&self, key: &K) -> Option<u64> {
        self.versions.lock().get(key).copied()
    }

    pub fn initial_version(&self) -> u64 {
        self.initial_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_first_version_is_initial() {
        let counter = VersionCounter::new(100);
        assert_eq!(counter.next_version(&["a"]).unwrap(), 100);
        assert_eq!(counter.next_version(&["a"]).unwrap(), 101);
        assert_eq!(counter.next_version(&["b"]).unwrap(), 100);
    }

    #[test]
    fn test_multi_key_takes_max() {
        let counter = VersionCounter::new(1);
        counter.next_version(&["a"]).unwrap();
        counter.next_version(&["a"]).unwrap();
        counter.next_version(&["a"]).unwrap();
        assert_eq!(counter.current(&"a"), Some(3));

        assert_eq!(counter.next_version(&["a", "b"]).unwrap(), 4);
        assert_eq!(counter.current(&"b"), Some(4));
        assert_eq!(counter.next_version(&["b"]).unwrap(), 5);
        assert_eq!(counter.current(&"c"), None);
    }

    #[test]
    fn test_exhausted_key_fails_without_recording() {
        let counter = VersionCounter::new(u64::MAX - 1);
        assert_eq!(counter.next_version(&["a"]).unwrap(), u64::MAX - 1);
        assert_eq!(counter.next_version(&["a"]).unwrap(), u64::MAX);

        let result = counter.next_version(&["a", "b"]);
        assert!(matches!(result, Err(Error::VersionExhausted(v)) if v == u64::MAX));
        assert_eq!(counter.current(&"b"), None);
        assert_eq!(counter.current(&"a"), Some(u64::MAX));
    }

    #[test]
    fn test_concurrent_callers_get_unique_versions() {
        let counter = Arc::new(VersionCounter::new(0));
        let keys = ["x", "y"];

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    let key = keys[i % 2];
                    (0..100)
                        .map(|_| counter.next_version(&[key, "shared"]).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut issued = HashSet::new();
        for handle in handles {
            for version in handle.join().unwrap() {
                assert!(issued.insert(version), "version {version} issued twice");
            }
        }
        assert_eq!(issued.len(), 800);
        assert_eq!(counter.current(&"shared"), Some(799));
    }
}
