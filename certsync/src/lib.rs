//! Mirrors ConfigMaps and Secrets into the certificate directory of a static pod
//!
//! Static pods cannot mount ConfigMaps or Secrets. [`CertSyncController`] reads them from the
//! apiserver and materializes every key as a file below a destination directory on the host:
//!
//! ```text
//! <destination>/configmaps/<name>/<key>   mode 0644
//! <destination>/secrets/<name>/<key>      mode 0600
//! ```
//!
//! Each `<name>` directory is replaced atomically through [`atomicdir`], so a server reloading
//! its certificates never reads a key from one revision next to a certificate from another.
//!
//! ```no_run
//! use certsync::{CertSyncController, KubeResourceGetter, LoggingSink, UnrevisionedResource};
//! use std::sync::Arc;
//!
//! # async fn wrapper() -> anyhow::Result<()> {
//! let client = kube::Client::try_default().await?;
//! let controller = CertSyncController::new(
//!     "openshift-kube-apiserver",
//!     "/etc/kubernetes/static-pod-certs",
//!     vec![UnrevisionedResource::required("aggregator-client-ca")],
//!     vec![UnrevisionedResource::optional("serving-cert")],
//!     Arc::new(KubeResourceGetter::new(client)),
//!     Arc::new(LoggingSink),
//! );
//! controller.sync().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod events;
pub mod getter;
pub mod resource;
pub mod runner;


pub use controller::{CertSyncController, Error};
pub use events::{CertEvent, EventRecorder, EventSink, LoggingSink, Reason};
pub use getter::{KubeResourceGetter, ResourceGetter};
pub use resource::{ResourceKind, UnrevisionedResource};
