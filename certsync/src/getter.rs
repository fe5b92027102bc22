//! Fetching the keyed payload of ConfigMaps and Secrets
use async_trait::async_trait;
use atomicdir::FileSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};

use crate::resource::{config_map_files, secret_files, ResourceKind};

/// Source of the resources mirrored by [`CertSyncController`](crate::CertSyncController).
#[async_trait]
pub trait ResourceGetter: Send + Sync {
    /// Fetch `namespace/name` and convert its keys into files.
    ///
    /// Returns `Ok(None)` when the object does not exist.
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Option<FileSet>, kube::Error>;
}

/// [`ResourceGetter`] reading straight from the apiserver.
#[derive(Clone)]
pub struct KubeResourceGetter {
    client: Client,
}

impl KubeResourceGetter {
    /// Read resources through `client`
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceGetter for KubeResourceGetter {
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Option<FileSet>, kube::Error> {
        match kind {
            ResourceKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                Ok(api.get_opt(name).await?.as_ref().map(config_map_files))
            }
            ResourceKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                Ok(api.get_opt(name).await?.as_ref().map(secret_files))
            }
        }
    }
}
