use crate::{
    informer::{Availability, Start},
    ChangeHandler, ClientUpstream, Error, HasLister, ListerSet, Result, Upstream,
};
use ahash::AHashMap as HashMap;
use kube::runtime::reflector::ObjectRef;
use mesh_cache_core::{CacheConfig, SingleFlight, ZTUNNEL_APP_LABEL};
use mesh_cache_k8s_api::{
    labels::{Map, Selector},
    ConfigMap, DaemonSet, Deployment, Family, Pod, ReplicaSet, Resource, ResourceExt, ResourceKind,
    Service, Tracked,
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::{sync::RwLock, task::JoinHandle, time};

/// The scope unit key of a cluster-wide cache.
const CLUSTER_SCOPE: &str = "";

/// A watch-driven mirror of one cluster's resources.
///
/// Depending on [`CacheConfig::cluster_wide_access`], the cache runs a single
/// set of informers over every namespace, or one independent set per accessible
/// namespace. Each set is a scope unit that can be rebuilt on its own with
/// [`KubeCache::refresh`].
///
/// Readers take a shared lock and always observe a fully synced lister set.
/// Refreshes, client updates and `stop` take the exclusive lock for their full
/// duration.
pub struct KubeCache<U = ClientUpstream> {
    cluster: String,
    config: Arc<CacheConfig>,
    handler: ChangeHandler,
    state: RwLock<State<U>>,
    refreshing: SingleFlight<(), Error>,
}

/// The lifecycle of a scope unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    Unstarted,
    Syncing,
    Synced,
    Failed,
    Stopped,
}

/// A point-in-time view of one scope unit, used for metrics.
#[derive(Clone, Debug)]
pub struct UnitSnapshot {
    pub namespace: String,
    pub status: SyncStatus,
    pub sizes: Vec<(ResourceKind, usize)>,
}

struct State<U> {
    upstream: U,
    availability: HashMap<ResourceKind, Availability>,
    units: BTreeMap<String, Unit>,
    stopped: bool,
}

struct Unit {
    status: SyncStatus,
    listers: Option<ListerSet>,
    tasks: Vec<JoinHandle<()>>,
}

// === impl KubeCache ===

impl<U: Upstream> KubeCache<U> {
    /// Discovers the kinds served by the cluster and syncs every scope unit.
    pub async fn new(
        cluster: impl Into<String>,
        upstream: U,
        config: Arc<CacheConfig>,
        handler: ChangeHandler,
    ) -> Result<Self> {
        let cluster = cluster.into();
        let availability = discover(&cluster, &upstream, &config).await;

        let scopes = if config.cluster_wide_access {
            vec![CLUSTER_SCOPE.to_string()]
        } else {
            config.accessible_namespaces.clone()
        };
        let units = scopes
            .into_iter()
            .map(|scope| (scope, Unit::default()))
            .collect();

        let mut state = State {
            upstream,
            availability,
            units,
            stopped: false,
        };
        for scope in state.scopes() {
            state.rebuild(&cluster, &scope, &handler, &config).await?;
        }
        tracing::info!(%cluster, units = state.units.len(), "Cache started");

        Ok(Self {
            cluster,
            config,
            handler,
            state: RwLock::new(state),
            refreshing: SingleFlight::default(),
        })
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.config.cluster_wide_access
    }

    /// Returns a copy of the named object.
    pub async fn get<K>(&self, namespace: &str, name: &str) -> Result<K>
    where
        K: Tracked,
        ListerSet: HasLister<K>,
    {
        let state = self.state.read().await;
        state.check_running()?;
        match state.availability::<K>() {
            Availability::Enabled => {}
            Availability::Unsupported => return Err(self.unsupported::<K>()),
            Availability::GatewayApiNotReady => return Err(self.not_ready::<K>()),
        }

        let scope = self.scope_of(namespace);
        let (_, unit) = state.unit(&self.cluster, scope)?;
        let listers = unit.listers(&self.cluster, scope)?;
        let store = <ListerSet as HasLister<K>>::lister(listers)
            .ok_or_else(|| self.unsupported::<K>())?;

        let obj = store
            .get(&ObjectRef::new(name).within(namespace))
            .ok_or_else(|| Error::NotFound {
                kind: K::KIND,
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        Ok(K::clone(&obj))
    }

    /// Lists copies of the objects in `namespace` that match `selector`.
    ///
    /// An empty namespace lists every cached namespace. A kind that is not
    /// watched in this cluster lists as empty.
    pub async fn list<K>(&self, namespace: &str, selector: &str) -> Result<Vec<K>>
    where
        K: Tracked,
        ListerSet: HasLister<K>,
    {
        let state = self.state.read().await;
        state.check_running()?;
        match state.availability::<K>() {
            Availability::Enabled => {}
            Availability::Unsupported => return Ok(Vec::new()),
            Availability::GatewayApiNotReady => return Err(self.not_ready::<K>()),
        }

        let selector = Selector::parse(selector)?;

        let units = if namespace.is_empty() {
            state
                .units
                .iter()
                .map(|(scope, unit)| (scope.as_str(), unit))
                .collect::<Vec<_>>()
        } else {
            vec![state.unit(&self.cluster, self.scope_of(namespace))?]
        };

        let mut items = Vec::new();
        for (scope, unit) in units {
            let listers = unit.listers(&self.cluster, scope)?;
            let Some(store) = <ListerSet as HasLister<K>>::lister(listers) else {
                continue;
            };
            items.extend(
                store
                    .state()
                    .into_iter()
                    .filter(|obj| {
                        namespace.is_empty() || obj.namespace().as_deref() == Some(namespace)
                    })
                    .filter(|obj| selector.matches(obj.labels()))
                    .map(|obj| K::clone(&obj)),
            );
        }

        let mut items = K::reduce(items);
        items.sort_by(|a, b| {
            (a.namespace(), a.name_any()).cmp(&(b.namespace(), b.name_any()))
        });
        tracing::trace!(
            cluster = %self.cluster,
            %namespace,
            kind = %K::KIND,
            items = items.len(),
            "Listed"
        );
        Ok(items)
    }

    /// Rebuilds the scope unit holding `namespace`.
    ///
    /// In a cluster-wide cache this rebuilds the whole cluster. Reads wait until
    /// the new listers have synced; on failure the unit stays unusable until a
    /// later refresh succeeds.
    pub async fn refresh(&self, namespace: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_running()?;
        let scope = self.scope_of(namespace);
        if !state.units.contains_key(scope) {
            return Err(Error::NamespaceNotCached {
                cluster: self.cluster.clone(),
                namespace: namespace.to_string(),
            });
        }
        state
            .rebuild(&self.cluster, scope, &self.handler, &self.config)
            .await
    }

    /// Rebuilds every scope unit. Concurrent calls share a single rebuild.
    ///
    /// Callers that arrive once the shared rebuild has finished start a new
    /// one.
    pub async fn refresh_all(&self) -> Result<()> {
        self.refreshing
            .call(|| async move {
                let res = async {
                    let mut state = self.state.write().await;
                    state.check_running()?;
                    state
                        .rebuild_all(&self.cluster, &self.handler, &self.config)
                        .await
                }
                .await;
                // Only the caller running the rebuild detaches it, so waiters
                // never discard a newer flight.
                self.refreshing.reset();
                res
            })
            .await
    }

    /// Replaces the API client and rebuilds every scope unit with it.
    pub async fn update_client(&self, upstream: U) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_running()?;
        tracing::info!(cluster = %self.cluster, "Updating client");
        for unit in state.units.values_mut() {
            unit.stop(SyncStatus::Unstarted);
        }
        state.availability = discover(&self.cluster, &upstream, &self.config).await;
        state.upstream = upstream;
        state
            .rebuild_all(&self.cluster, &self.handler, &self.config)
            .await
    }

    /// Stops every informer. The cache cannot be restarted.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if state.stopped {
            return;
        }
        tracing::info!(cluster = %self.cluster, "Stopping cache");
        for unit in state.units.values_mut() {
            unit.stop(SyncStatus::Stopped);
        }
        state.stopped = true;
    }

    /// Describes each scope unit, or returns `None` if the cache is being
    /// rebuilt.
    pub fn snapshot(&self) -> Option<Vec<UnitSnapshot>> {
        let state = self.state.try_read().ok()?;
        let units = state
            .units
            .iter()
            .map(|(namespace, unit)| UnitSnapshot {
                namespace: namespace.clone(),
                status: unit.status,
                sizes: unit
                    .listers
                    .as_ref()
                    .map(ListerSet::sizes)
                    .unwrap_or_default(),
            })
            .collect();
        Some(units)
    }

    // === typed helpers ===

    pub async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
        self.get(namespace, name).await
    }

    pub async fn get_config_maps(&self, namespace: &str, selector: &str) -> Result<Vec<ConfigMap>> {
        self.list(namespace, selector).await
    }

    pub async fn get_deployments_with_selector(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Deployment>> {
        self.list(namespace, selector).await
    }

    pub async fn get_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        self.list(namespace, selector).await
    }

    /// Lists the newest ReplicaSet of each controller, plus unowned ones.
    pub async fn get_replica_sets(&self, namespace: &str) -> Result<Vec<ReplicaSet>> {
        self.list(namespace, "").await
    }

    /// Lists the services whose non-empty selector matches `labels`.
    pub async fn get_services_by_labels(
        &self,
        namespace: &str,
        labels: &Map,
    ) -> Result<Vec<Service>> {
        let services = self.list::<Service>(namespace, "").await?;
        Ok(services
            .into_iter()
            .filter(|svc| {
                let selector = svc.spec.as_ref().and_then(|spec| spec.selector.as_ref());
                match selector {
                    Some(selector) if !selector.is_empty() => {
                        Selector::from_map(selector.clone()).matches(labels)
                    }
                    _ => false,
                }
            })
            .collect())
    }

    /// Lists the ztunnel daemonsets visible to this cache.
    pub async fn get_ztunnel_daemon_sets(&self) -> Result<Vec<DaemonSet>> {
        self.list("", &ztunnel_selector()).await
    }

    /// Lists the pods of the first ztunnel daemonset.
    pub async fn get_ztunnel_pods(&self) -> Result<Vec<Pod>> {
        let daemon_sets = self.get_ztunnel_daemon_sets().await?;
        let Some(ds) = daemon_sets.first() else {
            tracing::debug!(cluster = %self.cluster, "No ztunnel daemonsets found");
            return Ok(Vec::new());
        };
        let namespace = ds.namespace().unwrap_or_default();
        self.list(&namespace, &ztunnel_selector()).await
    }

    fn scope_of<'n>(&self, namespace: &'n str) -> &'n str {
        if self.config.cluster_wide_access {
            CLUSTER_SCOPE
        } else {
            namespace
        }
    }

    fn unsupported<K: Tracked>(&self) -> Error {
        Error::Unsupported {
            cluster: self.cluster.clone(),
            kind: K::KIND,
        }
    }

    fn not_ready<K: Tracked>(&self) -> Error {
        Error::GatewayApiNotReady {
            cluster: self.cluster.clone(),
            kind: K::KIND,
        }
    }
}

fn ztunnel_selector() -> String {
    let (k, v) = ZTUNNEL_APP_LABEL;
    format!("{k}={v}")
}

fn scope_name(scope: &str) -> String {
    if scope.is_empty() {
        "all namespaces".to_string()
    } else {
        scope.to_string()
    }
}

/// Determines which kinds can be watched in the cluster.
///
/// Core kinds are always available. Istio kinds need their CRDs and must not
/// be excluded by configuration. A Gateway API kind whose CRD is missing while
/// the Gateway API itself is installed is reported as not ready.
async fn discover<U: Upstream>(
    cluster: &str,
    upstream: &U,
    config: &CacheConfig,
) -> HashMap<ResourceKind, Availability> {
    use mesh_cache_k8s_api::{gateway, istio};

    let mut discovery = Discovery {
        upstream,
        served: HashMap::default(),
    };
    let gateway_api = discovery
        .served_kinds(&gateway::K8sGateway::api_version(&()))
        .await
        .is_some();

    let mut availability = HashMap::default();
    macro_rules! classify {
        ($($ty:ty),+ $(,)?) => {
            $(
                let kind = <$ty as Tracked>::KIND;
                let served = discovery.serves::<$ty>().await;
                let a = match kind.family() {
                    Family::Kube => Availability::Enabled,
                    Family::Istio if served && !config.is_excluded(kind) => Availability::Enabled,
                    Family::Istio => Availability::Unsupported,
                    Family::GatewayApi | Family::GatewayApiExperimental => {
                        if served {
                            Availability::Enabled
                        } else if gateway_api {
                            tracing::warn!(%cluster, %kind, "Gateway API CRD is missing; restart to watch it");
                            Availability::GatewayApiNotReady
                        } else {
                            Availability::Unsupported
                        }
                    }
                };
                availability.insert(kind, a);
            )+
        };
    }

    classify!(
        ConfigMap,
        DaemonSet,
        Deployment,
        mesh_cache_k8s_api::Endpoints,
        Pod,
        ReplicaSet,
        Service,
        mesh_cache_k8s_api::StatefulSet,
        istio::DestinationRule,
        istio::EnvoyFilter,
        istio::Gateway,
        istio::ServiceEntry,
        istio::Sidecar,
        istio::VirtualService,
        istio::WorkloadEntry,
        istio::WorkloadGroup,
        istio::WasmPlugin,
        istio::Telemetry,
        istio::AuthorizationPolicy,
        istio::PeerAuthentication,
        istio::RequestAuthentication,
        gateway::K8sGateway,
        gateway::HTTPRoute,
        gateway::GRPCRoute,
        gateway::ReferenceGrant,
        gateway::TCPRoute,
        gateway::TLSRoute,
    );

    let enabled = availability
        .values()
        .filter(|a| **a == Availability::Enabled)
        .count();
    tracing::debug!(%cluster, enabled, "Discovered resource kinds");
    availability
}

struct Discovery<'u, U> {
    upstream: &'u U,
    served: HashMap<String, Option<Vec<String>>>,
}

impl<U: Upstream> Discovery<'_, U> {
    async fn served_kinds(&mut self, api_version: &str) -> Option<&Vec<String>> {
        if !self.served.contains_key(api_version) {
            let kinds = self.upstream.served_kinds(api_version).await;
            self.served.insert(api_version.to_string(), kinds);
        }
        self.served.get(api_version).and_then(Option::as_ref)
    }

    async fn serves<K: Tracked>(&mut self) -> bool {
        if K::KIND.family() == Family::Kube {
            return true;
        }
        let kind = K::kind(&());
        self.served_kinds(&K::api_version(&()))
            .await
            .is_some_and(|kinds| kinds.iter().any(|k| *k == kind))
    }
}

// === impl State ===

impl<U: Upstream> State<U> {
    fn check_running(&self) -> Result<()> {
        if self.stopped {
            return Err(Error::Stopped);
        }
        Ok(())
    }

    fn availability<K: Tracked>(&self) -> Availability {
        self.availability
            .get(&K::KIND)
            .copied()
            .unwrap_or(Availability::Unsupported)
    }

    fn scopes(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    fn unit(&self, cluster: &str, scope: &str) -> Result<(&str, &Unit)> {
        self.units
            .get_key_value(scope)
            .map(|(scope, unit)| (scope.as_str(), unit))
            .ok_or_else(|| Error::NamespaceNotCached {
                cluster: cluster.to_string(),
                namespace: scope.to_string(),
            })
    }

    async fn rebuild_all(
        &mut self,
        cluster: &str,
        handler: &ChangeHandler,
        config: &CacheConfig,
    ) -> Result<()> {
        let mut res = Ok(());
        for scope in self.scopes() {
            if let Err(error) = self.rebuild(cluster, &scope, handler, config).await {
                if res.is_ok() {
                    res = Err(error);
                }
            }
        }
        res
    }

    /// Replaces the unit's informers with a new set and waits for it to sync.
    async fn rebuild(
        &mut self,
        cluster: &str,
        scope: &str,
        handler: &ChangeHandler,
        config: &CacheConfig,
    ) -> Result<()> {
        if let Some(unit) = self.units.get_mut(scope) {
            unit.stop(SyncStatus::Syncing);
        }

        let start = Start {
            cluster,
            namespace: (!scope.is_empty()).then_some(scope),
            upstream: &self.upstream,
            availability: &self.availability,
            handler,
        };
        let (listers, tasks) = ListerSet::start(&start);
        let synced = time::timeout(config.sync_timeout, listers.synced()).await;

        let unit = self.units.entry(scope.to_string()).or_default();
        let error = match synced {
            Ok(Ok(())) => {
                tracing::debug!(%cluster, scope = %scope_name(scope), "Listers synced");
                unit.status = SyncStatus::Synced;
                unit.listers = Some(listers);
                unit.tasks = tasks;
                return Ok(());
            }
            Ok(Err(_)) => Error::SyncFailed {
                cluster: cluster.to_string(),
                scope: scope_name(scope),
            },
            Err(_) => Error::SyncTimeout {
                cluster: cluster.to_string(),
                scope: scope_name(scope),
                timeout: config.sync_timeout,
            },
        };

        for task in tasks {
            task.abort();
        }
        unit.status = SyncStatus::Failed;
        tracing::error!(%error, "Cache sync failure");
        Err(error)
    }
}

// === impl Unit ===

impl Default for Unit {
    fn default() -> Self {
        Self {
            status: SyncStatus::Unstarted,
            listers: None,
            tasks: Vec::new(),
        }
    }
}

impl Unit {
    fn listers(&self, cluster: &str, scope: &str) -> Result<&ListerSet> {
        match (self.status, self.listers.as_ref()) {
            (SyncStatus::Synced, Some(listers)) => Ok(listers),
            _ => Err(Error::NotSynced {
                cluster: cluster.to_string(),
                scope: scope_name(scope),
            }),
        }
    }

    fn stop(&mut self, status: SyncStatus) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.listers = None;
        self.status = status;
    }
}

impl Drop for Unit {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
