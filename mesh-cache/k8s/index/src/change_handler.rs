use mesh_cache_core::RegistryStatusCache;
use mesh_cache_k8s_api::Watched;
use std::sync::Arc;

/// Invalidates the registry status when a watched resource really changes.
///
/// Additions and deletions always invalidate. Updates invalidate only when the
/// resource version differs, so informer resyncs that redeliver unchanged
/// objects leave the registry status in place.
#[derive(Clone, Debug)]
pub struct ChangeHandler {
    registry: Arc<RegistryStatusCache>,
}

impl ChangeHandler {
    pub fn new(registry: Arc<RegistryStatusCache>) -> Self {
        Self { registry }
    }

    pub fn on_add(&self, obj: &Watched<'_>) {
        tracing::trace!(kind = %obj.kind(), "Added");
        self.registry.refresh_registry_status();
    }

    pub fn on_update(&self, old: &Watched<'_>, new: &Watched<'_>) {
        if new.changed_from(old) {
            tracing::trace!(
                kind = %new.kind(),
                old = old.resource_version().unwrap_or_default(),
                new = new.resource_version().unwrap_or_default(),
                "Updated"
            );
            self.registry.refresh_registry_status();
        }
    }

    pub fn on_delete(&self, obj: &Watched<'_>) {
        tracing::trace!(kind = %obj.kind(), "Deleted");
        self.registry.refresh_registry_status();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_cache_core::models::RegistryStatus;
    use mesh_cache_k8s_api::{istio::VirtualService, Service, Tracked};
    use serde_json::json;
    use std::time::Duration;

    fn handler() -> (ChangeHandler, Arc<RegistryStatusCache>) {
        let registry = Arc::new(RegistryStatusCache::new(Duration::from_secs(300)));
        registry.set_registry_status(RegistryStatus::default());
        (ChangeHandler::new(registry.clone()), registry)
    }

    fn service(rv: &str) -> Service {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "namespace": "bookinfo", "name": "reviews", "resourceVersion": rv },
        }))
        .expect("valid service")
    }

    fn virtual_service(rv: &str) -> VirtualService {
        serde_json::from_value(json!({
            "apiVersion": "networking.istio.io/v1",
            "kind": "VirtualService",
            "metadata": { "namespace": "bookinfo", "name": "reviews", "resourceVersion": rv },
            "spec": { "hosts": ["reviews"] },
        }))
        .expect("valid virtual service")
    }

    #[tokio::test]
    async fn unchanged_versions_keep_status() {
        let (handler, registry) = handler();
        let (old, new) = (service("7"), service("7"));
        handler.on_update(&old.watched().unwrap(), &new.watched().unwrap());
        assert!(registry.check_registry_status());
    }

    #[tokio::test]
    async fn changed_versions_invalidate() {
        let (handler, registry) = handler();
        let (old, new) = (virtual_service("7"), virtual_service("8"));
        handler.on_update(&old.watched().unwrap(), &new.watched().unwrap());
        assert!(!registry.check_registry_status());
    }

    #[tokio::test]
    async fn mismatched_kinds_keep_status() {
        let (handler, registry) = handler();
        let (old, new) = (service("7"), virtual_service("8"));
        handler.on_update(&old.watched().unwrap(), &new.watched().unwrap());
        assert!(registry.check_registry_status());
    }

    #[tokio::test]
    async fn additions_and_deletions_invalidate() {
        let (handler, registry) = handler();
        handler.on_add(&service("1").watched().unwrap());
        assert!(!registry.check_registry_status());

        registry.set_registry_status(RegistryStatus::default());
        handler.on_delete(&virtual_service("1").watched().unwrap());
        assert!(!registry.check_registry_status());
    }
}
