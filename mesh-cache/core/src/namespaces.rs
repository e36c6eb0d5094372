use crate::{models::Namespace, ExpiringStore};
use ahash::AHashMap as HashMap;
use std::{fmt, time::Duration};

/// Caches the namespaces a bearer token may list in each cluster.
///
/// Visibility depends on the caller's RBAC, so entries are keyed by
/// (cluster, token) and kept only for a short TTL.
#[derive(Debug)]
pub struct TokenNamespaceCache {
    store: ExpiringStore<Key, Entry>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct Key {
    cluster: String,
    token: String,
}

#[derive(Clone, Debug, Default)]
struct Entry {
    namespaces: Vec<Namespace>,
    by_name: HashMap<String, usize>,
}

// === impl TokenNamespaceCache ===

impl TokenNamespaceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: ExpiringStore::new(ttl),
        }
    }

    /// Replaces the namespace list of `token` in `cluster`.
    pub fn set_namespaces(&self, cluster: &str, token: &str, namespaces: Vec<Namespace>) {
        let entry = Entry::new(namespaces);
        tracing::debug!(%cluster, namespaces = entry.namespaces.len(), "Caching token namespaces");
        self.store.set(Key::new(cluster, token), entry);
    }

    /// Adds or replaces a single namespace in the entry for its cluster.
    pub fn set_namespace(&self, token: &str, namespace: Namespace) {
        let key = Key::new(&namespace.cluster, token);
        self.store
            .upsert(key, Entry::default, move |entry| entry.insert(namespace));
    }

    pub fn get_namespaces(&self, cluster: &str, token: &str) -> Option<Vec<Namespace>> {
        self.store
            .with(&Key::new(cluster, token), |entry| entry.namespaces.clone())
    }

    pub fn get_namespace(&self, cluster: &str, token: &str, name: &str) -> Option<Namespace> {
        self.store
            .with(&Key::new(cluster, token), |entry| {
                entry
                    .by_name
                    .get(name)
                    .map(|&i| entry.namespaces[i].clone())
            })
            .flatten()
    }

    /// Drops every entry of `cluster`, for all tokens.
    pub fn refresh_token_namespaces(&self, cluster: &str) {
        tracing::debug!(%cluster, "Dropping token namespaces");
        self.store.retain(|key| key.cluster != cluster);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

// === impl Key ===

impl Key {
    fn new(cluster: &str, token: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            token: token.to_string(),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("cluster", &self.cluster)
            .field("token", &"xxx")
            .finish()
    }
}

// === impl Entry ===

impl Entry {
    fn new(namespaces: Vec<Namespace>) -> Self {
        let mut entry = Self::default();
        for ns in namespaces {
            entry.insert(ns);
        }
        entry
    }

    fn insert(&mut self, ns: Namespace) {
        match self.by_name.get(&ns.name) {
            Some(&i) => self.namespaces[i] = ns,
            None => {
                self.by_name.insert(ns.name.clone(), self.namespaces.len());
                self.namespaces.push(ns);
            }
        }
    }
}
