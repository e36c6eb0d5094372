//! Mesh cache core
//!
//! Holds the configuration shared by every cluster cache, the console models the
//! caches store, and the small derived caches that sit beside the resource
//! cache:
//!
//! - [`TokenNamespaceCache`] remembers which namespaces a bearer token may see in
//!   a cluster, for a short TTL.
//! - [`RegistryStatusCache`] holds the synthesized mesh registry view until it
//!   expires or a watched resource changes.
//! - [`ProxyStatusCache`] and [`ZtunnelDumpCache`] hold operational snapshots
//!   that are replaced wholesale by their producers.
//!
//! None of these caches compute their values. Producers call the `set_*`
//! methods and consumers fall back to the API when a lookup misses.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod config;
mod expiring;
pub mod models;
mod namespaces;
mod proxy_status;
mod registry;
mod single_flight;
mod ztunnel;

pub use self::{
    config::CacheConfig,
    expiring::ExpiringStore,
    namespaces::TokenNamespaceCache,
    proxy_status::ProxyStatusCache,
    registry::RegistryStatusCache,
    single_flight::SingleFlight,
    ztunnel::ZtunnelDumpCache,
};

/// Label carried by ztunnel daemonsets and pods.
pub const ZTUNNEL_APP_LABEL: (&str, &str) = ("app", "ztunnel");
