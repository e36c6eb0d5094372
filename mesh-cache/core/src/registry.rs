use crate::{models::RegistryStatus, ExpiringStore};
use std::time::Duration;

/// Holds the last synthesized registry status.
///
/// The snapshot is dropped when it outlives its TTL or when
/// [`RegistryStatusCache::refresh_registry_status`] is called, whichever comes
/// first. This cache never computes a status itself.
#[derive(Debug)]
pub struct RegistryStatusCache {
    store: ExpiringStore<(), RegistryStatus>,
}

impl RegistryStatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: ExpiringStore::new(ttl),
        }
    }

    /// Returns true if a fresh snapshot is held.
    pub fn check_registry_status(&self) -> bool {
        self.store.with(&(), |_| ()).is_some()
    }

    pub fn get_registry_status(&self) -> Option<RegistryStatus> {
        self.store.get(&())
    }

    pub fn set_registry_status(&self, status: RegistryStatus) {
        self.store.set((), status);
    }

    /// Invalidates the current snapshot.
    pub fn refresh_registry_status(&self) {
        if self.store.remove(&()).is_some() {
            tracing::debug!("Registry status invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RegistryService;
    use tokio::time;

    fn status() -> RegistryStatus {
        RegistryStatus {
            services: vec![RegistryService {
                hostname: "reviews.bookinfo.svc.cluster.local".to_string(),
                namespace: "bookinfo".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_ttl() {
        let cache = RegistryStatusCache::new(Duration::from_secs(30));
        assert!(!cache.check_registry_status());

        cache.set_registry_status(status());
        assert!(cache.check_registry_status());
        assert_eq!(cache.get_registry_status(), Some(status()));

        time::advance(Duration::from_secs(31)).await;
        assert!(!cache.check_registry_status());
        assert_eq!(cache.get_registry_status(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_invalidates() {
        let cache = RegistryStatusCache::new(Duration::from_secs(30));
        cache.set_registry_status(status());
        cache.refresh_registry_status();
        assert!(!cache.check_registry_status());
        assert_eq!(cache.get_registry_status(), None);

        cache.set_registry_status(status());
        assert!(cache.check_registry_status());
    }
}
