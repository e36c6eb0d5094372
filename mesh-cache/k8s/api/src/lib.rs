#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod gateway;
pub mod istio;
pub mod labels;
mod resource;

pub use self::{
    labels::Selector,
    resource::{Family, ResourceKind, Tracked, Watched},
};
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        core::v1::{ConfigMap, Endpoints, Namespace, Pod, Service},
    },
    apimachinery::pkg::apis::meta::v1::Time,
};
pub use kube::{
    api::{ObjectMeta, ResourceExt},
    runtime::watcher,
    Client, Resource,
};
