use crate::models::ProxyStatus;
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;

/// Holds the most recent proxy sync status of every pod, by cluster.
#[derive(Debug, Default)]
pub struct ProxyStatusCache {
    by_pod: RwLock<HashMap<PodKey, ProxyStatus>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PodKey {
    cluster: String,
    namespace: String,
    pod: String,
}

impl ProxyStatusCache {
    /// Replaces every held status with `statuses`.
    ///
    /// Statuses whose proxy id is not of the form `<pod>.<namespace>` are
    /// skipped.
    pub fn set_pods_proxy_status(&self, statuses: Vec<ProxyStatus>) {
        let mut by_pod = HashMap::with_capacity(statuses.len());
        for status in statuses {
            let Some((pod, namespace)) = status.pod_and_namespace() else {
                tracing::debug!(proxy = %status.proxy_id, "Ignoring malformed proxy id");
                continue;
            };
            let key = PodKey {
                cluster: status.cluster_id.clone(),
                namespace: namespace.to_string(),
                pod: pod.to_string(),
            };
            by_pod.insert(key, status);
        }
        *self.by_pod.write() = by_pod;
    }

    pub fn get_pod_proxy_status(
        &self,
        cluster: &str,
        namespace: &str,
        pod: &str,
    ) -> Option<ProxyStatus> {
        let key = PodKey {
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
            pod: pod.to_string(),
        };
        self.by_pod.read().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_pod.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pod.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(cluster: &str, id: &str) -> ProxyStatus {
        ProxyStatus {
            proxy_id: id.to_string(),
            cluster_id: cluster.to_string(),
            istio_version: "1.24.0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn replaces_wholesale() {
        let cache = ProxyStatusCache::default();
        cache.set_pods_proxy_status(vec![
            status("east", "reviews-v1-abc.bookinfo"),
            status("west", "reviews-v1-abc.bookinfo"),
            status("east", "garbage"),
        ]);
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache
                .get_pod_proxy_status("west", "bookinfo", "reviews-v1-abc")
                .map(|s| s.cluster_id),
            Some("west".to_string())
        );

        cache.set_pods_proxy_status(vec![status("east", "ratings-v1-xyz.bookinfo")]);
        assert!(cache
            .get_pod_proxy_status("east", "bookinfo", "reviews-v1-abc")
            .is_none());
        assert!(cache
            .get_pod_proxy_status("east", "bookinfo", "ratings-v1-xyz")
            .is_some());
    }
}
