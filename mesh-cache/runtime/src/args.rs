use crate::{
    clusters::RemoteCluster,
    core::{models::BuildInfo, CacheConfig},
    index::{self, ClientUpstream, MeshCache},
    k8s::{Family, ResourceKind},
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::future;
use prometheus_client::registry::Registry;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(name = "mesh-cache", about = "A multi-cluster mesh resource cache")]
pub struct Args {
    #[clap(long, default_value = "mesh_cache=info,warn", env = "MESH_CACHE_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The name of the cluster this process runs in.
    #[clap(long, default_value = "east")]
    cluster_name: String,

    /// A remote cluster to cache, as `NAME=KUBECONFIG`. May be repeated.
    #[clap(long = "remote-cluster")]
    remote_clusters: Vec<RemoteCluster>,

    /// Namespaces to cache. Empty means every namespace.
    #[clap(long, value_delimiter = ',')]
    accessible_namespaces: Vec<String>,

    /// Watches every namespace even when accessible namespaces are listed.
    #[clap(long)]
    cluster_wide_access: bool,

    #[clap(long, default_value = "60")]
    sync_timeout_secs: u64,

    #[clap(long, default_value = "10")]
    token_namespace_ttl_secs: u64,

    #[clap(long, default_value = "300")]
    registry_status_ttl_secs: u64,

    #[clap(long, default_value = "20")]
    mesh_ttl_secs: u64,

    #[clap(long, default_value = "600")]
    ambient_check_ttl_secs: u64,

    #[clap(long, default_value = "240")]
    gateway_ttl_secs: u64,

    #[clap(long, default_value = "240")]
    waypoint_ttl_secs: u64,

    /// Zero disables the Istio status memo.
    #[clap(long, default_value = "30")]
    istio_status_ttl_secs: u64,

    /// Istio kinds never to watch, e.g. `Sidecar,EnvoyFilter`.
    #[clap(long, default_value = "")]
    excluded_istio_kinds: IstioKinds,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            cluster_name,
            remote_clusters,
            accessible_namespaces,
            cluster_wide_access,
            sync_timeout_secs,
            token_namespace_ttl_secs,
            registry_status_ttl_secs,
            mesh_ttl_secs,
            ambient_check_ttl_secs,
            gateway_ttl_secs,
            waypoint_ttl_secs,
            istio_status_ttl_secs,
            excluded_istio_kinds: IstioKinds(excluded_kinds),
        } = self;

        // Logging must be up before the caches sync, which happens before the
        // admin server can be built with their metrics.
        log_format.try_init(log_level)?;

        let config = CacheConfig {
            home_cluster: cluster_name.clone(),
            cluster_wide_access: cluster_wide_access || accessible_namespaces.is_empty(),
            accessible_namespaces,
            sync_timeout: Duration::from_secs(sync_timeout_secs),
            token_namespace_ttl: Duration::from_secs(token_namespace_ttl_secs),
            registry_status_ttl: Duration::from_secs(registry_status_ttl_secs),
            mesh_ttl: Duration::from_secs(mesh_ttl_secs),
            ambient_check_ttl: Duration::from_secs(ambient_check_ttl_secs),
            gateway_ttl: Duration::from_secs(gateway_ttl_secs),
            waypoint_ttl: Duration::from_secs(waypoint_ttl_secs),
            istio_status_ttl: Duration::from_secs(istio_status_ttl_secs),
            excluded_kinds,
        };

        let mut upstreams = BTreeMap::new();
        let home = client
            .clone()
            .try_client()
            .await
            .context("failed to build the home cluster client")?;
        upstreams.insert(cluster_name, ClientUpstream::new(home));

        let remotes = future::try_join_all(remote_clusters.iter().map(|remote| async move {
            Ok::<_, anyhow::Error>((remote.name.clone(), remote.client().await?))
        }))
        .await?;
        for (name, client) in remotes {
            if upstreams
                .insert(name.clone(), ClientUpstream::new(client))
                .is_some()
            {
                bail!("cluster {name} is configured more than once");
            }
        }

        let cache = Arc::new(MeshCache::new(config, upstreams).await?);
        cache.set_build_info(BuildInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit_hash: option_env!("GIT_SHA").unwrap_or_default().to_string(),
        });
        info!(
            clusters = cache.kube_caches().count(),
            "Caches synced"
        );

        let mut prom = <Registry>::default();
        index::metrics::register(prom.sub_registry_with_prefix("mesh_cache"), cache.clone());
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Block the main thread on the shutdown signal, then stop every
        // informer before exiting.
        let res = runtime.run().await;
        cache.stop().await;
        if res.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
struct IstioKinds(BTreeSet<ResourceKind>);

impl std::str::FromStr for IstioKinds {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                match ResourceKind::ALL
                    .iter()
                    .find(|kind| kind.family() == Family::Istio && kind.as_str() == name)
                {
                    Some(kind) => Ok(*kind),
                    None => bail!("{name} is not an Istio resource kind"),
                }
            })
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_istio_kinds() {
        let IstioKinds(kinds) = "Sidecar, EnvoyFilter".parse().unwrap();
        assert_eq!(
            kinds,
            [ResourceKind::EnvoyFilter, ResourceKind::Sidecar]
                .into_iter()
                .collect()
        );

        let IstioKinds(kinds) = "".parse().unwrap();
        assert!(kinds.is_empty());

        assert!("Pod".parse::<IstioKinds>().is_err());
        assert!("K8sGateway".parse::<IstioKinds>().is_err());
    }

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "mesh-cache",
            "--cluster-name=east",
            "--remote-cluster=west=/etc/kubeconfig/west",
            "--accessible-namespaces=bookinfo,istio-system",
            "--excluded-istio-kinds=WasmPlugin",
            "--istio-status-ttl-secs=0",
        ])
        .expect("flags must parse");
        assert_eq!(args.cluster_name, "east");
        assert_eq!(args.remote_clusters.len(), 1);
        assert_eq!(args.accessible_namespaces, ["bookinfo", "istio-system"]);
        assert!(!args.cluster_wide_access);
        assert!(args.excluded_istio_kinds.0.contains(&ResourceKind::WasmPlugin));
        assert_eq!(args.istio_status_ttl_secs, 0);
        assert_eq!(args.gateway_ttl_secs, 240);
    }
}
