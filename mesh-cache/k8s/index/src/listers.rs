use crate::{informer::Start, Upstream};
use kube::runtime::reflector::{store::WriterDropped, Store};
use mesh_cache_k8s_api::{
    gateway, istio, ConfigMap, DaemonSet, Deployment, Endpoints, Pod, ReplicaSet, ResourceKind,
    Service, StatefulSet, Tracked,
};
use tokio::task::JoinHandle;

/// Provides the lister of kind `K` within a [`ListerSet`].
pub trait HasLister<K: Tracked> {
    fn lister(&self) -> Option<&Store<K>>;
}

macro_rules! lister_set {
    ($($field:ident: $ty:ty),+ $(,)?) => {
        /// The listers of one scope unit: a namespace, or the whole cluster.
        ///
        /// A lister is absent when its kind is not watched in the cluster.
        pub struct ListerSet {
            $($field: Option<Store<$ty>>,)+
        }

        impl ListerSet {
            /// Starts one informer per watched kind.
            pub(crate) fn start<U: Upstream>(start: &Start<'_, U>) -> (Self, Vec<JoinHandle<()>>) {
                let mut tasks = Vec::new();
                let listers = Self {
                    $($field: start.spawn::<$ty>(&mut tasks),)+
                };
                (listers, tasks)
            }

            /// Completes once every informer has finished its initial listing.
            pub(crate) async fn synced(&self) -> Result<(), WriterDropped> {
                $(
                    if let Some(store) = self.$field.as_ref() {
                        store.wait_until_ready().await?;
                    }
                )+
                Ok(())
            }

            /// The number of objects held for each watched kind.
            pub(crate) fn sizes(&self) -> Vec<(ResourceKind, usize)> {
                let mut sizes = Vec::new();
                $(
                    if let Some(store) = self.$field.as_ref() {
                        sizes.push((<$ty as Tracked>::KIND, store.state().len()));
                    }
                )+
                sizes
            }
        }

        $(
            impl HasLister<$ty> for ListerSet {
                #[inline]
                fn lister(&self) -> Option<&Store<$ty>> {
                    self.$field.as_ref()
                }
            }
        )+
    };
}

lister_set! {
    config_maps: ConfigMap,
    daemon_sets: DaemonSet,
    deployments: Deployment,
    endpoints: Endpoints,
    pods: Pod,
    replica_sets: ReplicaSet,
    services: Service,
    stateful_sets: StatefulSet,

    destination_rules: istio::DestinationRule,
    envoy_filters: istio::EnvoyFilter,
    gateways: istio::Gateway,
    service_entries: istio::ServiceEntry,
    sidecars: istio::Sidecar,
    virtual_services: istio::VirtualService,
    workload_entries: istio::WorkloadEntry,
    workload_groups: istio::WorkloadGroup,
    wasm_plugins: istio::WasmPlugin,
    telemetries: istio::Telemetry,
    authorization_policies: istio::AuthorizationPolicy,
    peer_authentications: istio::PeerAuthentication,
    request_authentications: istio::RequestAuthentication,

    k8s_gateways: gateway::K8sGateway,
    k8s_http_routes: gateway::HTTPRoute,
    k8s_grpc_routes: gateway::GRPCRoute,
    k8s_reference_grants: gateway::ReferenceGrant,
    k8s_tcp_routes: gateway::TCPRoute,
    k8s_tls_routes: gateway::TLSRoute,
}
