#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use mesh_cache_core as core;
pub use mesh_cache_k8s_api as k8s;
pub use mesh_cache_k8s_index as index;

mod args;
mod clusters;

pub use self::{args::Args, clusters::RemoteCluster};
