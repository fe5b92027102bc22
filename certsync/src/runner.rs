//! Drives [`CertSyncController`] passes from watch events and a periodic resync
use std::{future::Future, time::Duration};

use futures::{future, stream::BoxStream, FutureExt, Stream, StreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, Client, Resource,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{controller::CertSyncController, resource::UnrevisionedResource};

/// Run sync passes until `shutdown` resolves.
///
/// A pass runs immediately, then on every item of `triggers` and whenever `resync_interval`
/// elapses without one. Triggers that queue up while a pass is running are folded into a
/// single follow-up pass. Failed passes are logged and retried on the next trigger or tick.
pub async fn run<S, F>(controller: &CertSyncController, mut triggers: S, resync_interval: Duration, shutdown: F)
where
    S: Stream<Item = ()> + Unpin,
    F: Future<Output = ()>,
{
    let mut resync = tokio::time::interval(resync_interval);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => break,
            _ = resync.tick() => debug!("periodic resync"),
            Some(()) = triggers.next() => {
                while let Some(Some(())) = triggers.next().now_or_never() {}
                debug!("resource changed");
            }
        }
        if let Err(err) = controller.sync().await {
            warn!(%err, "sync pass failed");
        }
        resync.reset();
    }
    info!("shutting down");
}

/// Fires whenever one of the controller's ConfigMaps or Secrets is added, modified or deleted.
///
/// A kind with a single configured name is watched through a `metadata.name` field selector;
/// otherwise every object of the kind in the namespace is watched and filtered by name.
/// Watch errors are logged and retried with backoff; the stream never ends on its own.
pub fn resource_triggers(client: Client, controller: &CertSyncController) -> BoxStream<'static, ()> {
    let config_maps = watch_names::<ConfigMap>(
        Api::namespaced(client.clone(), controller.namespace()),
        controller.config_maps(),
    );
    let secrets = watch_names::<Secret>(
        Api::namespaced(client, controller.namespace()),
        controller.secrets(),
    );
    futures::stream::select(config_maps, secrets).boxed()
}

fn watch_names<K>(api: Api<K>, resources: &[UnrevisionedResource]) -> BoxStream<'static, ()>
where
    K: Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + Send + 'static,
{
    if resources.is_empty() {
        return futures::stream::pending().boxed();
    }
    let names: Vec<String> = resources.iter().map(|r| r.name.clone()).collect();
    watcher(api, watch_config(&names))
        .default_backoff()
        .touched_objects()
        .filter_map(move |res| {
            future::ready(match res {
                Ok(obj) => obj
                    .meta()
                    .name
                    .as_ref()
                    .filter(|name| names.contains(name))
                    .map(|_| ()),
                Err(err) => {
                    warn!(%err, "watch failed");
                    None
                }
            })
        })
        .boxed()
}

fn watch_config(names: &[String]) -> watcher::Config {
    match names {
        [name] => watcher::Config::default().fields(&format!("metadata.name={name}")),
        _ => watcher::Config::default(),
    }
}
