//! Mesh cache
//!
//! A read-through cache of the Kubernetes, Istio and Gateway API resources of
//! every cluster in a service mesh, for use by a mesh console backend.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use mesh_cache_core as core;
pub use mesh_cache_k8s_api as k8s;
pub use mesh_cache_k8s_index::{
    metrics, ChangeHandler, ClientUpstream, Error, KubeCache, MeshCache, Result, SyncStatus,
    Upstream,
};
pub use mesh_cache_runtime::Args;
