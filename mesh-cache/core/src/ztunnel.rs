use crate::models::ZtunnelConfigDump;
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;

/// Holds the last config dump fetched from each ztunnel pod.
#[derive(Debug, Default)]
pub struct ZtunnelDumpCache {
    dumps: RwLock<HashMap<(String, String, String), ZtunnelConfigDump>>,
}

impl ZtunnelDumpCache {
    pub fn set_ztunnel_dump(
        &self,
        cluster: &str,
        namespace: &str,
        pod: &str,
        dump: ZtunnelConfigDump,
    ) {
        self.dumps.write().insert(
            (cluster.to_string(), namespace.to_string(), pod.to_string()),
            dump,
        );
    }

    pub fn get_ztunnel_dump(
        &self,
        cluster: &str,
        namespace: &str,
        pod: &str,
    ) -> Option<ZtunnelConfigDump> {
        self.dumps
            .read()
            .get(&(cluster.to_string(), namespace.to_string(), pod.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.dumps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dumps.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyed_by_cluster_namespace_and_pod() {
        let cache = ZtunnelDumpCache::default();
        let dump = ZtunnelConfigDump {
            workloads: vec![json!({ "name": "reviews-v1", "namespace": "bookinfo" })],
            ..Default::default()
        };
        cache.set_ztunnel_dump("east", "istio-system", "ztunnel-abc", dump.clone());

        assert_eq!(
            cache.get_ztunnel_dump("east", "istio-system", "ztunnel-abc"),
            Some(dump)
        );
        assert!(cache
            .get_ztunnel_dump("west", "istio-system", "ztunnel-abc")
            .is_none());

        cache.set_ztunnel_dump(
            "east",
            "istio-system",
            "ztunnel-abc",
            ZtunnelConfigDump::default(),
        );
        assert_eq!(
            cache.get_ztunnel_dump("east", "istio-system", "ztunnel-abc"),
            Some(ZtunnelConfigDump::default())
        );
        assert_eq!(cache.len(), 1);
    }
}
