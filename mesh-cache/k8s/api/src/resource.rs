use crate::{
    gateway, istio, ConfigMap, DaemonSet, Deployment, Endpoints, Pod, ReplicaSet, Service,
    StatefulSet,
};
use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{btree_map::Entry, BTreeMap};

/// The API family a tracked kind belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Kube,
    Istio,
    GatewayApi,
    GatewayApiExperimental,
}

macro_rules! resource_kinds {
    ($($family:ident => { $($kind:ident => $name:literal),+ $(,)? }),+ $(,)?) => {
        /// Every resource kind the cache can hold.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ResourceKind {
            $($($kind,)+)+
        }

        impl ResourceKind {
            pub const ALL: &'static [ResourceKind] = &[$($(ResourceKind::$kind,)+)+];

            pub fn family(&self) -> Family {
                match self {
                    $($(ResourceKind::$kind => Family::$family,)+)+
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($(ResourceKind::$kind => $name,)+)+
                }
            }
        }
    };
}

resource_kinds! {
    Kube => {
        ConfigMap => "ConfigMap",
        DaemonSet => "DaemonSet",
        Deployment => "Deployment",
        Endpoints => "Endpoints",
        Pod => "Pod",
        ReplicaSet => "ReplicaSet",
        Service => "Service",
        StatefulSet => "StatefulSet",
    },
    Istio => {
        DestinationRule => "DestinationRule",
        EnvoyFilter => "EnvoyFilter",
        Gateway => "Gateway",
        ServiceEntry => "ServiceEntry",
        Sidecar => "Sidecar",
        VirtualService => "VirtualService",
        WorkloadEntry => "WorkloadEntry",
        WorkloadGroup => "WorkloadGroup",
        WasmPlugin => "WasmPlugin",
        Telemetry => "Telemetry",
        AuthorizationPolicy => "AuthorizationPolicy",
        PeerAuthentication => "PeerAuthentication",
        RequestAuthentication => "RequestAuthentication",
    },
    GatewayApi => {
        K8sGateway => "K8sGateway",
        K8sHTTPRoute => "K8sHTTPRoute",
        K8sGRPCRoute => "K8sGRPCRoute",
        K8sReferenceGrant => "K8sReferenceGrant",
    },
    GatewayApiExperimental => {
        K8sTCPRoute => "K8sTCPRoute",
        K8sTLSRoute => "K8sTLSRoute",
    },
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A namespaced resource kind held by the cache.
///
/// Every implementor carries its `apiVersion` and `kind` statically, so values
/// handed out by the cache always serialize with their type information.
pub trait Tracked:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    const KIND: ResourceKind;

    /// Returns this object as a [`Watched`] value if changes to its kind affect
    /// the mesh registry.
    fn watched(&self) -> Option<Watched<'_>> {
        None
    }

    /// Post-processes a listing before it is returned to callers.
    fn reduce(items: Vec<Self>) -> Vec<Self> {
        items
    }
}

macro_rules! watched_kinds {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        /// A borrowed object of one of the kinds whose changes invalidate the
        /// registry status.
        #[derive(Copy, Clone, Debug)]
        pub enum Watched<'a> {
            $($variant(&'a $ty),)+
        }

        impl Watched<'_> {
            pub fn kind(&self) -> ResourceKind {
                match self {
                    $(Watched::$variant(_) => ResourceKind::$variant,)+
                }
            }

            pub fn resource_version(&self) -> Option<&str> {
                match self {
                    $(Watched::$variant(o) => o.meta().resource_version.as_deref(),)+
                }
            }

            /// Returns true if `other` is the same kind of object at a different
            /// resource version.
            pub fn changed_from(&self, other: &Watched<'_>) -> bool {
                match (self, other) {
                    $((Watched::$variant(a), Watched::$variant(b)) => {
                        a.meta().resource_version != b.meta().resource_version
                    })+
                    _ => false,
                }
            }
        }

        $(
            impl Tracked for $ty {
                const KIND: ResourceKind = ResourceKind::$variant;

                fn watched(&self) -> Option<Watched<'_>> {
                    Some(Watched::$variant(self))
                }
            }
        )+
    };
}

watched_kinds! {
    Service(Service),
    Endpoints(Endpoints),
    DestinationRule(istio::DestinationRule),
    EnvoyFilter(istio::EnvoyFilter),
    Gateway(istio::Gateway),
    ServiceEntry(istio::ServiceEntry),
    Sidecar(istio::Sidecar),
    VirtualService(istio::VirtualService),
    WorkloadEntry(istio::WorkloadEntry),
    WorkloadGroup(istio::WorkloadGroup),
    AuthorizationPolicy(istio::AuthorizationPolicy),
    PeerAuthentication(istio::PeerAuthentication),
    RequestAuthentication(istio::RequestAuthentication),
}

macro_rules! tracked {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl Tracked for $ty {
                const KIND: ResourceKind = ResourceKind::$kind;
            }
        )+
    };
}

tracked! {
    ConfigMap => ConfigMap,
    DaemonSet => DaemonSet,
    Deployment => Deployment,
    Pod => Pod,
    StatefulSet => StatefulSet,
    istio::WasmPlugin => WasmPlugin,
    istio::Telemetry => Telemetry,
    gateway::K8sGateway => K8sGateway,
    gateway::HTTPRoute => K8sHTTPRoute,
    gateway::GRPCRoute => K8sGRPCRoute,
    gateway::ReferenceGrant => K8sReferenceGrant,
    gateway::TCPRoute => K8sTCPRoute,
    gateway::TLSRoute => K8sTLSRoute,
}

impl Tracked for ReplicaSet {
    const KIND: ResourceKind = ResourceKind::ReplicaSet;

    /// Keeps only the newest ReplicaSet of each controlling owner. ReplicaSets
    /// without a controller are all kept.
    fn reduce(items: Vec<Self>) -> Vec<Self> {
        let mut newest = BTreeMap::<(String, String, String), ReplicaSet>::new();
        let mut reduced = Vec::with_capacity(items.len());
        for rs in items {
            let owner = rs
                .owner_references()
                .iter()
                .find(|o| o.controller == Some(true))
                .map(|o| (rs.namespace().unwrap_or_default(), o.kind.clone(), o.name.clone()));
            let Some(owner) = owner else {
                reduced.push(rs);
                continue;
            };
            match newest.entry(owner) {
                Entry::Vacant(entry) => {
                    entry.insert(rs);
                }
                Entry::Occupied(mut entry) => {
                    if rs.creation_timestamp() > entry.get().creation_timestamp() {
                        entry.insert(rs);
                    }
                }
            }
        }
        reduced.extend(newest.into_values());
        reduced
    }
}
