//! Values the console computes once and keeps in the derived caches.

use mesh_cache_k8s_api::{self as k8s, ResourceExt, Time};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A namespace as seen by one principal in one cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub name: String,
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<Time>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub is_ambient: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl Namespace {
    const REVISION_LABEL: &'static str = "istio.io/rev";
    const DATAPLANE_MODE_LABEL: &'static str = "istio.io/dataplane-mode";

    pub fn from_resource(cluster: impl Into<String>, ns: &k8s::Namespace) -> Self {
        let labels = ns.labels().clone();
        Self {
            name: ns.name_any(),
            cluster: cluster.into(),
            creation_timestamp: ns.creation_timestamp(),
            is_ambient: labels.get(Self::DATAPLANE_MODE_LABEL).map(String::as_str) == Some("ambient"),
            revision: labels.get(Self::REVISION_LABEL).cloned(),
            annotations: ns.annotations().clone(),
            labels,
        }
    }
}

/// The xDS sync state of one proxy, as reported by a control plane.
///
/// `proxy_id` has the form `<pod>.<namespace>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStatus {
    pub proxy_id: String,
    pub cluster_id: String,
    #[serde(default)]
    pub istio_version: String,
    #[serde(default)]
    pub cluster_sent: String,
    #[serde(default)]
    pub cluster_acked: String,
    #[serde(default)]
    pub listener_sent: String,
    #[serde(default)]
    pub listener_acked: String,
    #[serde(default)]
    pub route_sent: String,
    #[serde(default)]
    pub route_acked: String,
    #[serde(default)]
    pub endpoint_sent: String,
    #[serde(default)]
    pub endpoint_acked: String,
}

impl ProxyStatus {
    /// Splits `proxy_id` into its pod and namespace.
    pub fn pod_and_namespace(&self) -> Option<(&str, &str)> {
        let (pod, ns) = self.proxy_id.split_once('.')?;
        if pod.is_empty() || ns.is_empty() {
            return None;
        }
        Some((pod, ns))
    }
}

/// The control plane's view of the mesh: services and configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    #[serde(default)]
    pub services: Vec<RegistryService>,
    /// Istio configuration, keyed by kind.
    #[serde(default)]
    pub configuration: BTreeMap<String, Vec<Value>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryService {
    pub hostname: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A ztunnel config dump. Entries are kept as returned by the agent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZtunnelConfigDump {
    #[serde(default)]
    pub services: Vec<Value>,
    #[serde(default)]
    pub workloads: Vec<Value>,
    #[serde(default)]
    pub policies: Vec<Value>,
    #[serde(default)]
    pub certificates: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeCluster {
    pub name: String,
    #[serde(default)]
    pub api_endpoint: String,
    #[serde(default)]
    pub is_home: bool,
    #[serde(default)]
    pub accessible: bool,
    #[serde(default)]
    pub secret_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlane {
    pub cluster: KubeCluster,
    pub id: String,
    pub istiod_name: String,
    pub istiod_namespace: String,
    #[serde(default)]
    pub revision: String,
    /// Clusters whose data plane this control plane manages.
    #[serde(default)]
    pub managed_clusters: Vec<KubeCluster>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mesh {
    pub control_planes: Vec<ControlPlane>,
}

/// A workload summary, as kept for gateway and waypoint lookups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    pub cluster: String,
    /// The workload's kind, e.g. `Deployment`.
    pub kind: String,
    /// The ambient role of the workload (`waypoint` or `ztunnel`), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Time>,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub desired_replicas: i32,
    #[serde(default)]
    pub available_replicas: i32,
}

/// The health of one Istio control plane or addon component.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    #[serde(skip)]
    pub namespace: String,
    pub name: String,
    pub status: String,
    /// Whether the mesh cannot function without this component.
    pub is_core: bool,
}

pub type IstioComponentStatus = Vec<ComponentStatus>;

/// Identifies the running build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: String,
    #[serde(default)]
    pub commit_hash: String,
}
