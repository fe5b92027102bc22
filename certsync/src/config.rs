//! Command line configuration of `cert-syncer`
use std::{collections::BTreeSet, path::PathBuf, time::Duration};

use clap::Parser;
use thiserror::Error;

use crate::resource::{ResourceKind, UnrevisionedResource};

/// Rejected option combinations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Nothing to synchronize.
    #[error("no configmaps or secrets configured")]
    NoResources,

    /// An empty entry in one of the name lists.
    #[error("empty {0} name")]
    EmptyName(ResourceKind),

    /// A name that cannot be used as a directory below `configmaps/` or `secrets/`.
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        /// Kind of the resource
        kind: ResourceKind,
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// The same name was listed both as required and optional.
    #[error("{kind} {name} is listed as both required and optional")]
    Conflicting {
        /// Kind of the resource
        kind: ResourceKind,
        /// Its name
        name: String,
    },

    /// A zero resync interval.
    #[error("resync interval must be positive")]
    ZeroResync,
}

/// Mirrors ConfigMaps and Secrets into a static pod's certificate directory.
#[derive(Debug, Parser)]
#[command(name = "cert-syncer", version, about)]
pub struct Options {
    /// Namespace the resources are read from.
    #[arg(long, env = "POD_NAMESPACE")]
    pub namespace: String,

    /// Directory receiving `configmaps/<name>` and `secrets/<name>`.
    #[arg(long)]
    pub destination_dir: PathBuf,

    /// ConfigMaps that must exist.
    #[arg(long, value_delimiter = ',')]
    pub configmaps: Vec<String>,

    /// ConfigMaps that may be absent.
    #[arg(long, value_delimiter = ',')]
    pub optional_configmaps: Vec<String>,

    /// Secrets that must exist.
    #[arg(long, value_delimiter = ',')]
    pub secrets: Vec<String>,

    /// Secrets that may be absent.
    #[arg(long, value_delimiter = ',')]
    pub optional_secrets: Vec<String>,

    /// Seconds between full resyncs.
    #[arg(long, default_value_t = 60)]
    pub resync_interval: u64,

    /// Name of the pod events are attached to.
    ///
    /// Events are only logged when unset.
    #[arg(long, env = "POD_NAME")]
    pub pod_name: Option<String>,

    /// Reporting controller name of published events.
    #[arg(long, default_value = "cert-syncer")]
    pub controller_name: String,

    /// Only resync periodically, without watching the resources.
    #[arg(long)]
    pub no_watch: bool,
}

impl Options {
    /// Configured ConfigMaps, required ones first
    pub fn config_maps(&self) -> Vec<UnrevisionedResource> {
        resources(&self.configmaps, &self.optional_configmaps)
    }

    /// Configured Secrets, required ones first
    pub fn secrets(&self) -> Vec<UnrevisionedResource> {
        resources(&self.secrets, &self.optional_secrets)
    }

    /// Time between full resyncs
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval)
    }

    /// Reject unusable option combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resync_interval == 0 {
            return Err(ConfigError::ZeroResync);
        }
        check(ResourceKind::ConfigMap, &self.configmaps, &self.optional_configmaps)?;
        check(ResourceKind::Secret, &self.secrets, &self.optional_secrets)?;
        if self.config_maps().is_empty() && self.secrets().is_empty() {
            return Err(ConfigError::NoResources);
        }
        Ok(())
    }
}

fn resources(required: &[String], optional: &[String]) -> Vec<UnrevisionedResource> {
    let required = required.iter().map(UnrevisionedResource::required);
    let optional = optional.iter().map(UnrevisionedResource::optional);
    required.chain(optional).collect()
}

fn check(kind: ResourceKind, required: &[String], optional: &[String]) -> Result<(), ConfigError> {
    if required.iter().chain(optional).any(|n| n.trim().is_empty()) {
        return Err(ConfigError::EmptyName(kind));
    }
    for name in required.iter().chain(optional) {
        if let Err(err) = atomicdir::validate_file_name(name) {
            let reason = match err {
                atomicdir::Error::InvalidFileName { reason, .. } => reason,
                _ => "not a valid file name",
            };
            return Err(ConfigError::InvalidName {
                kind,
                name: name.clone(),
                reason,
            });
        }
    }
    let required: BTreeSet<_> = required.iter().collect();
    match optional.iter().find(|n| required.contains(n)) {
        Some(name) => Err(ConfigError::Conflicting {
            kind,
            name: name.clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        let base = ["cert-syncer", "--namespace", "ns", "--destination-dir", "/tmp/certs"];
        Options::try_parse_from(base.iter().chain(args)).unwrap()
    }

    #[test]
    fn comma_delimited_lists() {
        let opts = parse(&[
            "--configmaps",
            "ca,client-ca",
            "--optional-secrets",
            "serving-cert",
            "--secrets=a,b",
        ]);
        assert_eq!(opts.config_maps(), vec![
            UnrevisionedResource::required("ca"),
            UnrevisionedResource::required("client-ca"),
        ]);
        assert_eq!(opts.secrets(), vec![
            UnrevisionedResource::required("a"),
            UnrevisionedResource::required("b"),
            UnrevisionedResource::optional("serving-cert"),
        ]);
        assert_eq!(opts.validate(), Ok(()));
    }

    #[test]
    fn defaults() {
        let opts = parse(&["--secrets", "s"]);
        assert_eq!(opts.resync_interval(), Duration::from_secs(60));
        assert_eq!(opts.controller_name, "cert-syncer");
        assert!(!opts.no_watch);
    }

    #[test]
    fn rejects_unusable_combinations() {
        assert_eq!(parse(&[]).validate(), Err(ConfigError::NoResources));
        assert_eq!(
            parse(&["--configmaps", "ca", "--optional-configmaps", "ca"]).validate(),
            Err(ConfigError::Conflicting {
                kind: ResourceKind::ConfigMap,
                name: "ca".into()
            })
        );
        assert_eq!(
            parse(&["--secrets", "a,,b"]).validate(),
            Err(ConfigError::EmptyName(ResourceKind::Secret))
        );
        assert_eq!(
            parse(&["--secrets", "a", "--resync-interval", "0"]).validate(),
            Err(ConfigError::ZeroResync)
        );
    }

    #[test]
    fn rejects_names_that_are_not_directories() {
        assert_eq!(
            parse(&["--secrets", "a", "--optional-secrets", ".."]).validate(),
            Err(ConfigError::InvalidName {
                kind: ResourceKind::Secret,
                name: "..".into(),
                reason: "refers to a directory",
            })
        );
        assert!(matches!(
            parse(&["--configmaps", "ca/../../etc"]).validate(),
            Err(ConfigError::InvalidName { kind: ResourceKind::ConfigMap, reason: "contains a path separator", .. })
        ));
        let err = parse(&["--optional-configmaps", "."]).validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid configmap name \".\": refers to a directory");
    }
}
