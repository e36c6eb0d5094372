use mesh_cache_k8s_api::{labels, ResourceKind};
use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error("cache for cluster [{0}] not found")]
    UnknownCluster(String),

    #[error("no client configured for home cluster [{0}]")]
    MissingHomeCluster(String),

    #[error("cache doesn't support [resourceType: {kind}] in cluster [{cluster}]")]
    Unsupported { cluster: String, kind: ResourceKind },

    #[error("Gateway API resource [{kind}] is not installed in cluster [{cluster}]; its CRD appeared after the cache was started")]
    GatewayApiNotReady { cluster: String, kind: ResourceKind },

    #[error(transparent)]
    Selector(#[from] labels::ParseError),

    #[error("namespace [{namespace}] is not cached in cluster [{cluster}]")]
    NamespaceNotCached { cluster: String, namespace: String },

    #[error("informers for [{scope}] in cluster [{cluster}] did not sync within {timeout:?}")]
    SyncTimeout {
        cluster: String,
        scope: String,
        timeout: Duration,
    },

    #[error("informers for [{scope}] in cluster [{cluster}] stopped before syncing")]
    SyncFailed { cluster: String, scope: String },

    #[error("cache for [{scope}] in cluster [{cluster}] is not synced")]
    NotSynced { cluster: String, scope: String },

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    #[error("cache is stopped")]
    Stopped,
}
