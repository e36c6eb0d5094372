//! Mesh resource index
//!
//! Mirrors the Kubernetes, Istio and Gateway API resources of every cluster in
//! the mesh so the console can answer reads without touching the API servers.
//!
//! - A [`KubeCache`] runs informers for each tracked kind of one cluster,
//!   either over every namespace or over each accessible namespace, and serves
//!   typed `get`/`list` reads from the resulting listers.
//! - The informers of watched kinds report changes to a [`ChangeHandler`],
//!   which invalidates the registry status only when a resource version
//!   actually changed.
//! - A [`MeshCache`] holds one `KubeCache` per cluster alongside the derived
//!   caches from `mesh-cache-core`.
//!
//! ```text
//! [ Upstream ] -> [ informer ] -> [ Store<K> ] <- get/list
//!                      |
//!                      v
//!               [ ChangeHandler ] -> [ RegistryStatusCache ]
//! ```

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod change_handler;
mod error;
mod informer;
mod kube_cache;
mod listers;
mod mesh_cache;
pub mod metrics;
mod upstream;


pub use self::{
    change_handler::ChangeHandler,
    error::{Error, Result},
    kube_cache::{KubeCache, SyncStatus, UnitSnapshot},
    listers::{HasLister, ListerSet},
    mesh_cache::MeshCache,
    upstream::{ClientUpstream, Upstream},
};
