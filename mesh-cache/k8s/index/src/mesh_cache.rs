use crate::{ChangeHandler, ClientUpstream, Error, KubeCache, Result, Upstream};
use futures::future;
use mesh_cache_core::{
    models::{BuildInfo, IstioComponentStatus, KubeCluster, Mesh, Workload},
    CacheConfig, ExpiringStore, ProxyStatusCache, RegistryStatusCache, TokenNamespaceCache,
    ZtunnelDumpCache,
};
use mesh_cache_k8s_api::Pod;
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};

/// One resource cache per cluster, plus the derived caches shared by all of
/// them.
pub struct MeshCache<U = ClientUpstream> {
    config: Arc<CacheConfig>,
    caches: BTreeMap<String, Arc<KubeCache<U>>>,
    namespaces: TokenNamespaceCache,
    registry: Arc<RegistryStatusCache>,
    proxy_status: ProxyStatusCache,
    ztunnel: ZtunnelDumpCache,
    mesh: ExpiringStore<(), Mesh>,
    gateways: ExpiringStore<(), Vec<Workload>>,
    waypoints: ExpiringStore<(), Vec<Workload>>,
    istio_status: ExpiringStore<(), IstioComponentStatus>,
    ambient: ExpiringStore<String, bool>,
    /// Whether each cluster's client may list mutating webhooks. Checked once
    /// at construction.
    webhook_access: BTreeMap<String, bool>,
    clusters: RwLock<Vec<KubeCluster>>,
    build_info: RwLock<BuildInfo>,
}

// === impl MeshCache ===

impl<U: Upstream> MeshCache<U> {
    /// Starts a cache for every cluster in `upstreams` and waits for all of
    /// them to sync.
    ///
    /// Fails if `upstreams` has no entry for the home cluster.
    pub async fn new(config: CacheConfig, upstreams: BTreeMap<String, U>) -> Result<Self> {
        if !upstreams.contains_key(&config.home_cluster) {
            return Err(Error::MissingHomeCluster(config.home_cluster.clone()));
        }

        let config = Arc::new(config);
        let registry = Arc::new(RegistryStatusCache::new(config.registry_status_ttl));

        let started = future::try_join_all(upstreams.into_iter().map(|(cluster, upstream)| {
            let config = config.clone();
            let handler = ChangeHandler::new(registry.clone());
            async move {
                let webhooks = upstream.can_list_webhooks().await;
                if !webhooks {
                    tracing::info!(
                        %cluster,
                        "Unable to list mutating webhooks; revision tags will not be detected"
                    );
                }
                let cache = KubeCache::new(cluster.clone(), upstream, config, handler).await?;
                Ok::<_, Error>((cluster, Arc::new(cache), webhooks))
            }
        }))
        .await?;

        let mut caches = BTreeMap::new();
        let mut webhook_access = BTreeMap::new();
        for (cluster, cache, webhooks) in started {
            webhook_access.insert(cluster.clone(), webhooks);
            caches.insert(cluster, cache);
        }

        tracing::info!(
            home = %config.home_cluster,
            clusters = caches.len(),
            "Mesh cache started"
        );
        Ok(Self {
            namespaces: TokenNamespaceCache::new(config.token_namespace_ttl),
            proxy_status: ProxyStatusCache::default(),
            ztunnel: ZtunnelDumpCache::default(),
            mesh: ExpiringStore::new(config.mesh_ttl),
            gateways: ExpiringStore::new(config.gateway_ttl),
            waypoints: ExpiringStore::new(config.waypoint_ttl),
            istio_status: ExpiringStore::new(config.istio_status_ttl),
            ambient: ExpiringStore::new(config.ambient_check_ttl),
            clusters: RwLock::new(Vec::new()),
            build_info: RwLock::new(BuildInfo::default()),
            webhook_access,
            caches,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get_kube_cache(&self, cluster: &str) -> Result<Arc<KubeCache<U>>> {
        self.caches
            .get(cluster)
            .cloned()
            .ok_or_else(|| Error::UnknownCluster(cluster.to_string()))
    }

    /// The cache of the cluster this process runs in.
    pub fn home_cache(&self) -> Result<Arc<KubeCache<U>>> {
        self.get_kube_cache(&self.config.home_cluster)
    }

    pub fn kube_caches(&self) -> impl Iterator<Item = (&str, &Arc<KubeCache<U>>)> {
        self.caches
            .iter()
            .map(|(cluster, cache)| (cluster.as_str(), cache))
    }

    pub fn token_namespaces(&self) -> &TokenNamespaceCache {
        &self.namespaces
    }

    pub fn registry_status(&self) -> &RegistryStatusCache {
        &self.registry
    }

    pub fn proxy_status(&self) -> &ProxyStatusCache {
        &self.proxy_status
    }

    pub fn ztunnel_dumps(&self) -> &ZtunnelDumpCache {
        &self.ztunnel
    }

    pub fn get_clusters(&self) -> Vec<KubeCluster> {
        self.clusters.read().clone()
    }

    pub fn set_clusters(&self, clusters: Vec<KubeCluster>) {
        *self.clusters.write() = clusters;
    }

    /// Returns the mesh topology if it was set within the mesh TTL.
    pub fn get_mesh(&self) -> Option<Mesh> {
        self.mesh.get(&())
    }

    pub fn set_mesh(&self, mesh: Mesh) {
        self.mesh.set((), mesh);
    }

    /// Returns the gateway workloads of every cluster if they were set within
    /// the gateway TTL.
    pub fn get_gateways(&self) -> Option<Vec<Workload>> {
        self.gateways.get(&())
    }

    pub fn set_gateways(&self, gateways: Vec<Workload>) {
        self.gateways.set((), gateways);
    }

    pub fn get_waypoints(&self) -> Option<Vec<Workload>> {
        self.waypoints.get(&())
    }

    pub fn set_waypoints(&self, waypoints: Vec<Workload>) {
        self.waypoints.set((), waypoints);
    }

    pub fn get_istio_status(&self) -> Option<IstioComponentStatus> {
        self.istio_status.get(&())
    }

    /// Remembers the component status for the Istio status TTL. Nothing is
    /// kept when that TTL is zero.
    pub fn set_istio_status(&self, status: IstioComponentStatus) {
        if self.istio_status.ttl().is_zero() {
            return;
        }
        self.istio_status.set((), status);
    }

    pub fn get_build_info(&self) -> BuildInfo {
        self.build_info.read().clone()
    }

    pub fn set_build_info(&self, build_info: BuildInfo) {
        *self.build_info.write() = build_info;
    }

    /// Whether the client of `cluster` may list mutating webhook
    /// configurations. Unknown clusters cannot.
    pub fn can_list_webhooks(&self, cluster: &str) -> bool {
        self.webhook_access.get(cluster).copied().unwrap_or(false)
    }

    /// Whether ambient mode is installed in `cluster`, judged by the presence
    /// of a ztunnel daemonset.
    ///
    /// Successful answers are remembered for the ambient-check TTL.
    pub async fn is_ambient_enabled(&self, cluster: &str) -> Result<bool> {
        if let Some(enabled) = self.ambient.get(&cluster.to_string()) {
            return Ok(enabled);
        }

        let cache = self.get_kube_cache(cluster)?;
        let enabled = !cache.get_ztunnel_daemon_sets().await?.is_empty();
        tracing::debug!(%cluster, enabled, "Checked for ambient mode");
        self.ambient.set(cluster.to_string(), enabled);
        Ok(enabled)
    }

    pub async fn get_ztunnel_pods(&self, cluster: &str) -> Result<Vec<Pod>> {
        self.get_kube_cache(cluster)?.get_ztunnel_pods().await
    }

    /// Stops every cluster cache.
    pub async fn stop(&self) {
        future::join_all(self.caches.values().map(|cache| cache.stop())).await;
        tracing::info!("Mesh cache stopped");
    }
}
