use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, hash::Hash, time::Duration};
use tokio::time::Instant;

/// A map whose entries read as absent once they are older than the TTL.
///
/// Expiry is lazy: reads skip stale entries, and every write drops the
/// entries that have expired. No task runs in the background.
#[derive(Debug)]
pub struct ExpiringStore<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, Slot<V>>>,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    created: Instant,
}

// === impl ExpiringStore ===

impl<K: Eq + Hash, V: Clone> ExpiringStore<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.with(key, V::clone)
    }

    /// Applies `f` to a fresh entry without cloning it.
    pub fn with<T>(&self, key: &K, f: impl FnOnce(&V) -> T) -> Option<T> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.created.elapsed() > self.ttl {
            return None;
        }
        Some(f(&entry.value))
    }

    pub fn set(&self, key: K, value: V) {
        let mut entries = self.entries.write();
        self.sweep(&mut entries);
        entries.insert(
            key,
            Slot {
                value,
                created: Instant::now(),
            },
        );
    }

    /// Modifies a fresh entry in place, or stores `init()` if the entry is
    /// missing or stale. The entry's age is reset either way.
    pub fn upsert(&self, key: K, init: impl FnOnce() -> V, f: impl FnOnce(&mut V)) {
        let mut entries = self.entries.write();
        self.sweep(&mut entries);
        let now = Instant::now();
        // Stale entries were just swept, so an occupied slot is fresh.
        let entry = match entries.entry(key) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => vacant.insert(Slot {
                value: init(),
                created: now,
            }),
        };
        f(&mut entry.value);
        entry.created = now;
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().remove(key).map(|e| e.value)
    }

    /// Drops every entry whose key does not satisfy `f`.
    pub fn retain(&self, mut f: impl FnMut(&K) -> bool) {
        self.entries.write().retain(|k, _| f(k));
    }

    /// Counts entries that have not yet expired.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|e| e.created.elapsed() <= self.ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(&self, entries: &mut HashMap<K, Slot<V>>) {
        let ttl = self.ttl;
        entries.retain(|_, slot| slot.created.elapsed() <= ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_lazily() {
        let store = ExpiringStore::new(Duration::from_secs(10));
        store.set("a", 1);
        assert_eq!(store.get(&"a"), Some(1));

        time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.get(&"a"), Some(1), "an entry is fresh at exactly the TTL");

        time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.get(&"a"), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn upsert_replaces_stale_values() {
        let store = ExpiringStore::new(Duration::from_secs(5));
        store.upsert("a", Vec::new, |v| v.push(1));
        store.upsert("a", Vec::new, |v| v.push(2));
        assert_eq!(store.get(&"a"), Some(vec![1, 2]));

        time::advance(Duration::from_secs(6)).await;
        store.upsert("a", Vec::new, |v| v.push(3));
        assert_eq!(store.get(&"a"), Some(vec![3]));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_drop_expired_entries() {
        let store = ExpiringStore::new(Duration::from_secs(10));
        for i in 0..1000 {
            store.set(format!("token-{i}"), i);
            time::advance(Duration::from_secs(11)).await;
        }
        assert_eq!(store.entries.read().len(), 1);
        assert!(store.is_empty());

        store.upsert("token-1000".to_string(), || 0, |v| *v += 1);
        assert_eq!(store.entries.read().len(), 1);
        assert_eq!(store.get(&"token-1000".to_string()), Some(1));

        // Fresh entries survive the sweep.
        store.set("token-1001".to_string(), 0);
        assert_eq!(store.len(), 2);
    }
}
