use futures::{stream::BoxStream, StreamExt};
use kube::{api::PostParams, Api};
use mesh_cache_k8s_api::{
    api::authorization::v1::{
        ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
    },
    watcher, Client, Tracked,
};

/// Limits the amount of time a watch can be idle before being reset.
///
/// Must be less than 295 or Kubernetes throws an error.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// The source of watch events and API discovery for one cluster.
#[async_trait::async_trait]
pub trait Upstream: Clone + Send + Sync + 'static {
    /// Watches every object of kind `K`, or only those in `namespace`.
    ///
    /// The stream must first emit the full initial listing (`Init`,
    /// `InitApply`*, `InitDone`) and then incremental changes. Errors are
    /// transient; the stream must not terminate.
    fn watch<K: Tracked>(
        &self,
        namespace: Option<&str>,
    ) -> BoxStream<'static, watcher::Result<watcher::Event<K>>>;

    /// Lists the kinds served under `api_version`, or returns `None` if the
    /// group version is not served at all.
    async fn served_kinds(&self, api_version: &str) -> Option<Vec<String>>;

    /// Whether this client may list mutating webhook configurations.
    async fn can_list_webhooks(&self) -> bool;
}

/// Watches a live API server.
#[derive(Clone)]
pub struct ClientUpstream {
    client: Client,
}

// === impl ClientUpstream ===

impl ClientUpstream {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl From<Client> for ClientUpstream {
    fn from(client: Client) -> Self {
        Self::new(client)
    }
}

#[async_trait::async_trait]
impl Upstream for ClientUpstream {
    fn watch<K: Tracked>(
        &self,
        namespace: Option<&str>,
    ) -> BoxStream<'static, watcher::Result<watcher::Event<K>>> {
        let api = match namespace {
            Some(ns) => Api::<K>::namespaced(self.client.clone(), ns),
            None => Api::<K>::all(self.client.clone()),
        };
        let config = watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);
        watcher::watcher(api, config).boxed()
    }

    async fn served_kinds(&self, api_version: &str) -> Option<Vec<String>> {
        match self.client.list_api_group_resources(api_version).await {
            Ok(list) => Some(list.resources.into_iter().map(|r| r.kind).collect()),
            Err(error) => {
                tracing::debug!(%error, %api_version, "API group version is not served");
                None
            }
        }
    }

    async fn can_list_webhooks(&self) -> bool {
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    group: Some("admissionregistration.k8s.io".to_string()),
                    resource: Some("mutatingwebhookconfigurations".to_string()),
                    verb: Some("list".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let api = Api::<SelfSubjectAccessReview>::all(self.client.clone());
        match api.create(&PostParams::default(), &review).await {
            Ok(review) => review.status.is_some_and(|status| status.allowed),
            Err(error) => {
                tracing::warn!(%error, "Failed to check access to mutating webhooks");
                false
            }
        }
    }
}
