//! Mirrors configured ConfigMaps and Secrets into a destination directory
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use atomicdir::{FileSystem, OsFileSystem, SyncOutcome};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    events::{CertEvent, EventSink},
    getter::ResourceGetter,
    resource::{staging_base, staging_root, ResourceKind, UnrevisionedResource, CONTENT_DIR_PERM},
};

/// Errors from a sync pass
#[derive(Debug, Error)]
pub enum Error {
    /// The resource could not be fetched; its directory was left alone.
    #[error("failed to get {kind} {namespace}/{name}: {source}")]
    Fetch {
        /// Kind of the resource
        kind: ResourceKind,
        /// Namespace it was looked up in
        namespace: String,
        /// Its name
        name: String,
        /// The apiserver error
        #[source]
        source: kube::Error,
    },

    /// A resource that is not optional does not exist.
    #[error("required {kind} {namespace}/{name} not found")]
    RequiredNotFound {
        /// Kind of the resource
        kind: ResourceKind,
        /// Namespace it was looked up in
        namespace: String,
        /// Its name
        name: String,
    },

    /// Writing the resource's files failed; the previous content is still in place.
    #[error("failed to sync {kind} {name}: {source}")]
    Sync {
        /// Kind of the resource
        kind: ResourceKind,
        /// Its name
        name: String,
        /// Why the sync failed
        #[source]
        source: atomicdir::Error,
    },

    /// Removing the directory of an absent optional resource failed.
    #[error("failed to remove {}: {source}", path.display())]
    Remove {
        /// The content directory
        path: PathBuf,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// The configured name cannot be used as a directory name.
    #[error("invalid {kind} name {name:?}: {source}")]
    InvalidName {
        /// Kind of the resource
        kind: ResourceKind,
        /// The rejected name
        name: String,
        /// Why it was rejected
        #[source]
        source: atomicdir::Error,
    },

    /// A blocking filesystem task did not complete.
    #[error("filesystem task failed: {0}")]
    Task(#[source] tokio::task::JoinError),

    /// At least one resource failed during a pass.
    #[error("{} of {total} resources failed to sync: {}", failures.len(), summarize(failures))]
    Pass {
        /// Number of resources attempted
        total: usize,
        /// One error per failed resource, in configured order
        failures: Vec<Error>,
    },
}

fn summarize(failures: &[Error]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// What a resource sync left below `<destination>/staging`.
enum Staging {
    Clean,
    Leftover,
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(Error::Task)
}

/// Keeps `<destination>/configmaps/<name>` and `<destination>/secrets/<name>` in sync with the
/// configured objects.
///
/// Every directory is replaced atomically, so processes reading certificates from it never
/// observe a half-written set. Resources are independent: a pass that fails for one still
/// attempts all others, and the next pass repairs whatever was left behind.
///
/// The controller assumes it is the only writer below the destination directory.
pub struct CertSyncController {
    namespace: String,
    destination_dir: PathBuf,
    config_maps: Vec<UnrevisionedResource>,
    secrets: Vec<UnrevisionedResource>,
    getter: Arc<dyn ResourceGetter>,
    events: Arc<dyn EventSink>,
    fs: Arc<dyn FileSystem>,
}

impl CertSyncController {
    /// Mirror `config_maps` and `secrets` from `namespace` into `destination_dir`.
    pub fn new(
        namespace: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
        config_maps: Vec<UnrevisionedResource>,
        secrets: Vec<UnrevisionedResource>,
        getter: Arc<dyn ResourceGetter>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            destination_dir: destination_dir.into(),
            config_maps,
            secrets,
            getter,
            events,
            fs: Arc::new(OsFileSystem),
        }
    }

    /// Perform all filesystem access through `fs`
    #[must_use]
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Namespace the resources are read from
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Root of the materialized directories
    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    /// Configured ConfigMaps
    pub fn config_maps(&self) -> &[UnrevisionedResource] {
        &self.config_maps
    }

    /// Configured Secrets
    pub fn secrets(&self) -> &[UnrevisionedResource] {
        &self.secrets
    }

    fn resources(&self) -> impl Iterator<Item = (ResourceKind, &UnrevisionedResource)> {
        let cms = self.config_maps.iter().map(|r| (ResourceKind::ConfigMap, r));
        let secrets = self.secrets.iter().map(|r| (ResourceKind::Secret, r));
        cms.chain(secrets)
    }

    /// Run one pass over every configured resource, ConfigMaps first, in configured order.
    ///
    /// Failed attempts keep their staging directories for inspection until a pass succeeds
    /// for every resource, which clears `<destination>/staging`.
    ///
    /// # Errors
    ///
    /// [`Error::Pass`] listing every resource that failed. All resources are attempted.
    pub async fn sync(&self) -> Result<()> {
        let mut total = 0;
        let mut failures = Vec::new();
        let mut leftovers = false;
        for (kind, resource) in self.resources() {
            total += 1;
            match self.sync_resource(kind, resource).await {
                Ok(Staging::Clean) => {}
                Ok(Staging::Leftover) => leftovers = true,
                Err(err) => {
                    error!(%kind, name = %resource.name, %err, "sync failed");
                    failures.push(err);
                }
            }
        }
        if !failures.is_empty() {
            return Err(Error::Pass { total, failures });
        }
        if !leftovers {
            self.clear_staging().await;
        }
        Ok(())
    }

    async fn sync_resource(&self, kind: ResourceKind, resource: &UnrevisionedResource) -> Result<Staging> {
        let name = resource.name.as_str();
        if let Err(source) = atomicdir::validate_file_name(name) {
            let err = Error::InvalidName {
                kind,
                name: name.to_string(),
                source,
            };
            self.publish_failure(kind, name, &err).await;
            return Err(err);
        }
        let content_dir = kind.content_dir(&self.destination_dir, name);

        let files = match self.getter.get(kind, &self.namespace, name).await {
            Ok(Some(files)) => files,
            Ok(None) if resource.optional => {
                return self.remove(kind, name, content_dir).await.map(|()| Staging::Clean);
            }
            Ok(None) => {
                let err = Error::RequiredNotFound {
                    kind,
                    namespace: self.namespace.clone(),
                    name: name.to_string(),
                };
                self.publish_failure(kind, name, &err).await;
                return Err(err);
            }
            Err(source) => {
                let err = Error::Fetch {
                    kind,
                    namespace: self.namespace.clone(),
                    name: name.to_string(),
                    source,
                };
                self.publish_failure(kind, name, &err).await;
                return Err(err);
            }
        };

        let attempt = Uuid::new_v4().to_string();
        let staging_dir = kind.staging_dir(&self.destination_dir, &attempt, name);
        debug!(%kind, name, ?content_dir, ?staging_dir, files = files.len(), "syncing");

        let fs = self.fs.clone();
        let outcome =
            blocking(move || atomicdir::sync(fs.as_ref(), &content_dir, CONTENT_DIR_PERM, &staging_dir, &files))
                .await?;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(source) => {
                let err = Error::Sync {
                    kind,
                    name: name.to_string(),
                    source,
                };
                self.publish_failure(kind, name, &err).await;
                return Err(err);
            }
        };

        let staging = if let SyncOutcome::Leftover { staging_dir, source, .. } = &outcome {
            warn!(%kind, name, ?staging_dir, %source, "synced, but failed to remove staging directory");
            Staging::Leftover
        } else {
            self.remove_staging_root(&attempt).await;
            Staging::Clean
        };

        if outcome.is_changed() {
            info!(%kind, name, "wrote updated files");
            self.events
                .publish(CertEvent::updated(kind, &self.namespace, name))
                .await;
        }
        Ok(staging)
    }

    async fn remove(&self, kind: ResourceKind, name: &str, content_dir: PathBuf) -> Result<()> {
        let fs = self.fs.clone();
        let removed = blocking(move || match content_dir.try_exists() {
            Ok(false) => Ok(false),
            Ok(true) | Err(_) => fs
                .remove_all(&content_dir)
                .map(|()| true)
                .map_err(|source| Error::Remove {
                    path: content_dir,
                    source,
                }),
        })
        .await?;

        match removed {
            Ok(false) => {
                debug!(%kind, name, "optional resource absent, nothing to remove");
                Ok(())
            }
            Ok(true) => {
                info!(%kind, name, "optional resource absent, removed its files");
                self.events
                    .publish(CertEvent::removed(kind, &self.namespace, name))
                    .await;
                Ok(())
            }
            Err(err) => {
                self.publish_failure(kind, name, &err).await;
                Err(err)
            }
        }
    }

    // Only called once the swap committed and the staging dir is gone; the per-attempt root
    // then holds nothing but empty parents.
    async fn remove_staging_root(&self, attempt: &str) {
        let root = staging_root(&self.destination_dir, attempt);
        let fs = self.fs.clone();
        match blocking(move || fs.remove_all(&root).map_err(|err| (root, err))).await {
            Ok(Ok(())) => {}
            Ok(Err((root, err))) => debug!(?root, %err, "failed to remove staging root"),
            Err(err) => debug!(%err, "failed to remove staging root"),
        }
    }

    // Drops attempt roots kept by earlier failed passes.
    async fn clear_staging(&self) {
        let base = staging_base(&self.destination_dir);
        let fs = self.fs.clone();
        match blocking(move || fs.remove_all(&base).map_err(|err| (base, err))).await {
            Ok(Ok(())) => {}
            Ok(Err((base, err))) => warn!(?base, %err, "failed to clear staging directories"),
            Err(err) => warn!(%err, "failed to clear staging directories"),
        }
    }

    async fn publish_failure(&self, kind: ResourceKind, name: &str, err: &Error) {
        self.events
            .publish(CertEvent::update_failed(kind, &self.namespace, name, err))
            .await;
    }
}
