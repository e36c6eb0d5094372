use crate::{MeshCache, SyncStatus, Upstream};
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};
use std::sync::Arc;

struct Instrumented<U>(Arc<MeshCache<U>>);

pub fn register<U: Upstream>(reg: &mut Registry, cache: Arc<MeshCache<U>>) {
    reg.register_collector(Box::new(Instrumented(cache)));
}

/// Saturates instead of wrapping on counts that do not fit a gauge.
fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl<U> std::fmt::Debug for Instrumented<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumented").finish_non_exhaustive()
    }
}

impl<U: Upstream> Collector for Instrumented<U> {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let cache = &self.0;

        // A cache that is being rebuilt is skipped rather than waited on.
        let snapshots = cache
            .kube_caches()
            .filter_map(|(cluster, kc)| Some((cluster, kc.snapshot()?)))
            .collect::<Vec<_>>();

        let mut sizes_encoder = encoder.encode_descriptor(
            "resource_cache_size",
            "The number of objects held by each lister",
            None,
            MetricType::Gauge,
        )?;
        for (cluster, units) in &snapshots {
            for unit in units {
                for (kind, size) in &unit.sizes {
                    let labels = [
                        ("cluster", *cluster),
                        ("namespace", unit.namespace.as_str()),
                        ("kind", kind.as_str()),
                    ];
                    let size = ConstGauge::new(count(*size));
                    let size_encoder = sizes_encoder.encode_family(&labels)?;
                    size.encode(size_encoder)?;
                }
            }
        }

        let mut synced_encoder = encoder.encode_descriptor(
            "scope_synced",
            "Whether the listers of a scope unit are synced (1) or not (0)",
            None,
            MetricType::Gauge,
        )?;
        for (cluster, units) in &snapshots {
            for unit in units {
                let labels = [
                    ("cluster", *cluster),
                    ("namespace", unit.namespace.as_str()),
                ];
                let synced = ConstGauge::new(i64::from(unit.status == SyncStatus::Synced));
                let synced_encoder = synced_encoder.encode_family(&labels)?;
                synced.encode(synced_encoder)?;
            }
        }

        let token_namespaces = ConstGauge::new(count(cache.token_namespaces().len()));
        let token_namespaces_encoder = encoder.encode_descriptor(
            "token_namespace_entries",
            "The number of fresh token namespace entries",
            None,
            MetricType::Gauge,
        )?;
        token_namespaces.encode(token_namespaces_encoder)?;

        let proxy_status = ConstGauge::new(count(cache.proxy_status().len()));
        let proxy_status_encoder = encoder.encode_descriptor(
            "proxy_status_entries",
            "The number of cached pod proxy statuses",
            None,
            MetricType::Gauge,
        )?;
        proxy_status.encode(proxy_status_encoder)?;

        let ztunnel = ConstGauge::new(count(cache.ztunnel_dumps().len()));
        let ztunnel_encoder = encoder.encode_descriptor(
            "ztunnel_dump_entries",
            "The number of cached ztunnel config dumps",
            None,
            MetricType::Gauge,
        )?;
        ztunnel.encode(ztunnel_encoder)?;

        let registry = ConstGauge::new(i64::from(cache.registry_status().check_registry_status()));
        let registry_encoder = encoder.encode_descriptor(
            "registry_status_fresh",
            "Whether a fresh registry status is cached (1) or not (0)",
            None,
            MetricType::Gauge,
        )?;
        registry.encode(registry_encoder)?;

        Ok(())
    }
}
