use crate::Upstream;
use futures::{future, stream, stream::BoxStream, StreamExt};
use mesh_cache_k8s_api::{
    gateway, istio, watcher, ConfigMap, DaemonSet, Deployment, Endpoints, Family, Pod, ReplicaSet,
    Resource, ResourceKind, Service, StatefulSet, Tracked,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// An in-memory API server.
///
/// Watches list the fixtures present when they start and then follow the
/// changes made through [`FakeUpstream::apply`] and [`FakeUpstream::delete`].
/// Fixtures added with [`FakeUpstream::add_fixture`] are only seen by watches
/// started afterwards.
#[derive(Clone)]
pub struct FakeUpstream {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    objects: Vec<Value>,
    missing_groups: HashSet<String>,
    missing_kinds: HashSet<ResourceKind>,
    stalled: bool,
    watches: usize,
    webhook_access: bool,
    changes: broadcast::Sender<Change>,
}

#[derive(Clone, Debug)]
enum Change {
    Apply(Value),
    Delete(Value),
}

/// Returns the `apiVersion` and `kind` of a tracked kind.
pub fn type_meta(kind: ResourceKind) -> (String, String) {
    macro_rules! meta {
        ($($variant:ident => $ty:ty),+ $(,)?) => {
            match kind {
                $(ResourceKind::$variant => (
                    <$ty as Resource>::api_version(&()).into_owned(),
                    <$ty as Resource>::kind(&()).into_owned(),
                ),)+
            }
        };
    }
    meta! {
        ConfigMap => ConfigMap,
        DaemonSet => DaemonSet,
        Deployment => Deployment,
        Endpoints => Endpoints,
        Pod => Pod,
        ReplicaSet => ReplicaSet,
        Service => Service,
        StatefulSet => StatefulSet,
        DestinationRule => istio::DestinationRule,
        EnvoyFilter => istio::EnvoyFilter,
        Gateway => istio::Gateway,
        ServiceEntry => istio::ServiceEntry,
        Sidecar => istio::Sidecar,
        VirtualService => istio::VirtualService,
        WorkloadEntry => istio::WorkloadEntry,
        WorkloadGroup => istio::WorkloadGroup,
        WasmPlugin => istio::WasmPlugin,
        Telemetry => istio::Telemetry,
        AuthorizationPolicy => istio::AuthorizationPolicy,
        PeerAuthentication => istio::PeerAuthentication,
        RequestAuthentication => istio::RequestAuthentication,
        K8sGateway => gateway::K8sGateway,
        K8sHTTPRoute => gateway::HTTPRoute,
        K8sGRPCRoute => gateway::GRPCRoute,
        K8sReferenceGrant => gateway::ReferenceGrant,
        K8sTCPRoute => gateway::TCPRoute,
        K8sTLSRoute => gateway::TLSRoute,
    }
}

/// Builds a minimal object of `kind` at resource version 1.
///
/// Custom resources get a spec that satisfies the required fields of every
/// tracked CRD.
pub fn object(kind: ResourceKind, namespace: &str, name: &str) -> Value {
    let (api_version, kind_name) = type_meta(kind);
    let mut obj = json!({
        "apiVersion": api_version,
        "kind": kind_name,
        "metadata": {
            "namespace": namespace,
            "name": name,
            "uid": format!("{namespace}-{name}"),
            "resourceVersion": "1",
            "creationTimestamp": "2024-01-01T00:00:00Z",
        },
    });
    if kind.family() != Family::Kube {
        obj["spec"] = json!({
            "gatewayClassName": "istio",
            "listeners": [],
            "from": [],
            "to": [],
            "rules": [],
        });
    }
    obj
}

pub fn labeled(mut obj: Value, labels: BTreeMap<&str, &str>) -> Value {
    obj["metadata"]["labels"] = json!(labels);
    obj
}

pub fn with_version(mut obj: Value, resource_version: &str) -> Value {
    obj["metadata"]["resourceVersion"] = json!(resource_version);
    obj
}

fn same_object(a: &Value, b: &Value) -> bool {
    a["apiVersion"] == b["apiVersion"]
        && a["kind"] == b["kind"]
        && a["metadata"]["namespace"] == b["metadata"]["namespace"]
        && a["metadata"]["name"] == b["metadata"]["name"]
}

fn decode<K: Tracked>(obj: &Value) -> K {
    serde_json::from_value(obj.clone()).expect("fixture must decode")
}

// === impl FakeUpstream ===

impl Default for FakeUpstream {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                objects: Vec::new(),
                missing_groups: HashSet::new(),
                missing_kinds: HashSet::new(),
                stalled: false,
                watches: 0,
                webhook_access: true,
                changes,
            })),
        }
    }
}

impl FakeUpstream {
    pub fn with_fixtures(objects: impl IntoIterator<Item = Value>) -> Self {
        let upstream = Self::default();
        for obj in objects {
            upstream.add_fixture(obj);
        }
        upstream
    }

    /// Stores an object without notifying running watches.
    pub fn add_fixture(&self, obj: Value) {
        let mut inner = self.inner.lock();
        inner.objects.retain(|o| !same_object(o, &obj));
        inner.objects.push(obj);
    }

    /// Stores an object and notifies running watches.
    pub fn apply(&self, obj: Value) {
        let mut inner = self.inner.lock();
        inner.objects.retain(|o| !same_object(o, &obj));
        inner.objects.push(obj.clone());
        let _ = inner.changes.send(Change::Apply(obj));
    }

    pub fn delete(&self, obj: Value) {
        let mut inner = self.inner.lock();
        inner.objects.retain(|o| !same_object(o, &obj));
        let _ = inner.changes.send(Change::Delete(obj));
    }

    /// Stops serving an API group version.
    pub fn without_group(self, api_version: &str) -> Self {
        self.inner
            .lock()
            .missing_groups
            .insert(api_version.to_string());
        self
    }

    /// Stops serving one kind while its group version stays available.
    pub fn without_kind(self, kind: ResourceKind) -> Self {
        self.inner.lock().missing_kinds.insert(kind);
        self
    }

    /// Denies listing mutating webhook configurations.
    pub fn without_webhook_access(self) -> Self {
        self.inner.lock().webhook_access = false;
        self
    }

    /// When stalled, watches never complete their initial listing.
    pub fn set_stalled(&self, stalled: bool) {
        self.inner.lock().stalled = stalled;
    }

    /// The number of watches started so far.
    pub fn watches(&self) -> usize {
        self.inner.lock().watches
    }
}

#[async_trait::async_trait]
impl Upstream for FakeUpstream {
    fn watch<K: Tracked>(
        &self,
        namespace: Option<&str>,
    ) -> BoxStream<'static, watcher::Result<watcher::Event<K>>> {
        let mut inner = self.inner.lock();
        inner.watches += 1;
        if inner.stalled {
            return stream::pending().boxed();
        }

        let (api_version, kind) = type_meta(K::KIND);
        let namespace = namespace.map(str::to_string);
        let matches = move |obj: &Value| {
            obj["apiVersion"] == api_version
                && obj["kind"] == kind
                && namespace
                    .as_deref()
                    .is_none_or(|ns| obj["metadata"]["namespace"].as_str() == Some(ns))
        };

        let initial = inner
            .objects
            .iter()
            .filter(|obj| matches(obj))
            .map(|obj| watcher::Event::InitApply(decode::<K>(obj)))
            .collect::<Vec<_>>();
        let initial = std::iter::once(watcher::Event::Init)
            .chain(initial)
            .chain(std::iter::once(watcher::Event::InitDone))
            .map(Ok);

        let updates = BroadcastStream::new(inner.changes.subscribe()).filter_map(move |change| {
            let event = match change {
                Ok(Change::Apply(obj)) if matches(&obj) => {
                    Some(Ok(watcher::Event::Apply(decode::<K>(&obj))))
                }
                Ok(Change::Delete(obj)) if matches(&obj) => {
                    Some(Ok(watcher::Event::Delete(decode::<K>(&obj))))
                }
                _ => None,
            };
            future::ready(event)
        });

        stream::iter(initial).chain(updates).boxed()
    }

    async fn served_kinds(&self, api_version: &str) -> Option<Vec<String>> {
        let inner = self.inner.lock();
        if inner.missing_groups.contains(api_version) {
            return None;
        }
        let kinds = ResourceKind::ALL
            .iter()
            .filter(|kind| !inner.missing_kinds.contains(*kind))
            .map(|kind| type_meta(*kind))
            .filter(|(group, _)| group == api_version)
            .map(|(_, kind)| kind)
            .collect::<Vec<_>>();
        if kinds.is_empty() {
            return None;
        }
        Some(kinds)
    }

    async fn can_list_webhooks(&self) -> bool {
        self.inner.lock().webhook_access
    }
}
