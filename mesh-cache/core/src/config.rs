use mesh_cache_k8s_api::ResourceKind;
use std::{collections::BTreeSet, time::Duration};

/// Settings shared by every cache of the process.
///
/// Built once at startup and passed to constructors; nothing reads it from
/// global state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// The cluster this process runs in. Its client must always be present.
    pub home_cluster: String,

    /// When set, one informer set watches every namespace. Otherwise one
    /// informer set is started per entry of `accessible_namespaces`.
    pub cluster_wide_access: bool,

    pub accessible_namespaces: Vec<String>,

    /// Bounds the wait for a fresh informer set to finish its initial list.
    pub sync_timeout: Duration,

    pub token_namespace_ttl: Duration,

    pub registry_status_ttl: Duration,

    pub mesh_ttl: Duration,

    pub ambient_check_ttl: Duration,

    pub gateway_ttl: Duration,

    pub waypoint_ttl: Duration,

    /// A zero TTL disables the Istio status memo.
    pub istio_status_ttl: Duration,

    /// Istio kinds that must never be watched, even when their CRDs exist.
    pub excluded_kinds: BTreeSet<ResourceKind>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            home_cluster: "east".to_string(),
            cluster_wide_access: true,
            accessible_namespaces: Vec::new(),
            sync_timeout: Duration::from_secs(60),
            token_namespace_ttl: Duration::from_secs(10),
            registry_status_ttl: Duration::from_secs(300),
            mesh_ttl: Duration::from_secs(20),
            ambient_check_ttl: Duration::from_secs(600),
            gateway_ttl: Duration::from_secs(240),
            waypoint_ttl: Duration::from_secs(240),
            istio_status_ttl: Duration::from_secs(30),
            excluded_kinds: BTreeSet::new(),
        }
    }
}

impl CacheConfig {
    pub fn is_excluded(&self, kind: ResourceKind) -> bool {
        self.excluded_kinds.contains(&kind)
    }
}
