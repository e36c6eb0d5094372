use crate::{ChangeHandler, Upstream};
use futures::{stream::BoxStream, StreamExt};
use kube::runtime::{
    reflector::{self, ObjectRef, Store},
    WatchStreamExt,
};
use mesh_cache_k8s_api::{watcher, Resource, ResourceKind, Tracked};
use tokio::{task::JoinHandle, time};
use tracing::{info_span, Instrument};

/// Whether a kind can be watched in a cluster.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Availability {
    Enabled,
    Unsupported,
    /// The Gateway API is installed but this kind's CRD was not present when
    /// the cache was started.
    GatewayApiNotReady,
}

/// Everything needed to start the informers of one scope unit.
pub(crate) struct Start<'a, U> {
    pub(crate) cluster: &'a str,
    pub(crate) namespace: Option<&'a str>,
    pub(crate) upstream: &'a U,
    pub(crate) availability: &'a ahash::AHashMap<ResourceKind, Availability>,
    pub(crate) handler: &'a ChangeHandler,
}

impl<U: Upstream> Start<'_, U> {
    /// Spawns an informer for `K` and returns its lister, or `None` if the kind
    /// is not watched in this cluster.
    pub(crate) fn spawn<K: Tracked>(&self, tasks: &mut Vec<JoinHandle<()>>) -> Option<Store<K>> {
        if self.availability.get(&K::KIND) != Some(&Availability::Enabled) {
            return None;
        }

        let (reader, writer) = reflector::store::<K>();
        let events = self
            .upstream
            .watch::<K>(self.namespace)
            .modify(strip_unused_fields::<K>)
            .boxed();
        let span = info_span!(
            "informer",
            cluster = %self.cluster,
            namespace = self.namespace.unwrap_or_default(),
            kind = %K::KIND,
        );
        let task = tokio::spawn(
            run(events, reader.clone(), writer, self.handler.clone()).instrument(span),
        );
        tasks.push(task);
        Some(reader)
    }
}

/// Drops fields that are never read back from the cache before objects are
/// stored.
fn strip_unused_fields<K: Resource>(obj: &mut K) {
    obj.meta_mut().managed_fields = None;
}

/// Applies watch events to the store, notifying `handler` of changes to
/// watched kinds before each event is applied.
///
/// If the stream fails, log the error and sleep for 1s before polling for a
/// reset event.
async fn run<K: Tracked>(
    mut events: BoxStream<'static, watcher::Result<watcher::Event<K>>>,
    reader: Store<K>,
    mut writer: reflector::store::Writer<K>,
    handler: ChangeHandler,
) {
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                notify(&handler, &reader, &event);
                writer.apply_watcher_event(&event);
                if matches!(event, watcher::Event::InitDone) {
                    tracing::debug!(objects = reader.state().len(), "Synced");
                }
            }
            Err(error) => {
                tracing::info!(%error, "Watch failed");
                time::sleep(time::Duration::from_secs(1)).await;
            }
        }
    }
    tracing::debug!("Watch terminated");
}

fn notify<K: Tracked>(handler: &ChangeHandler, reader: &Store<K>, event: &watcher::Event<K>) {
    match event {
        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
            let Some(new) = obj.watched() else {
                return;
            };
            match reader.get(&ObjectRef::from_obj(obj)) {
                Some(old) => {
                    if let Some(old) = old.watched() {
                        handler.on_update(&old, &new);
                    }
                }
                None => handler.on_add(&new),
            }
        }
        watcher::Event::Delete(obj) => {
            if let Some(obj) = obj.watched() {
                handler.on_delete(&obj);
            }
        }
        watcher::Event::Init | watcher::Event::InitDone => {}
    }
}
