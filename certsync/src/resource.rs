//! The ConfigMaps and Secrets mirrored onto disk
use std::{fmt, path::PathBuf, path::Path};

use atomicdir::{File, FileSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};

/// Mode of every content directory.
pub const CONTENT_DIR_PERM: u32 = 0o755;

/// The kind of a mirrored resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A `v1/ConfigMap`
    ConfigMap,
    /// A `v1/Secret`
    Secret,
}

impl ResourceKind {
    /// Directory under the destination root holding one sub-directory per resource.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::ConfigMap => "configmaps",
            Self::Secret => "secrets",
        }
    }

    /// Mode of the files materialized from this kind of resource.
    ///
    /// Secret material is readable by the owner only.
    pub fn file_perm(self) -> u32 {
        match self {
            Self::ConfigMap => 0o644,
            Self::Secret => 0o600,
        }
    }

    /// `<destination>/<configmaps|secrets>/<name>`
    pub fn content_dir(self, destination: &Path, name: &str) -> PathBuf {
        destination.join(self.dir_name()).join(name)
    }

    /// `<destination>/staging/<attempt>/<configmaps|secrets>/<name>`
    pub fn staging_dir(self, destination: &Path, attempt: &str, name: &str) -> PathBuf {
        staging_root(destination, attempt).join(self.dir_name()).join(name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConfigMap => "configmap",
            Self::Secret => "secret",
        })
    }
}

/// `<destination>/staging`, holding one directory per sync attempt.
pub fn staging_base(destination: &Path) -> PathBuf {
    destination.join("staging")
}

/// `<destination>/staging/<attempt>`, removed after a successful attempt.
pub fn staging_root(destination: &Path, attempt: &str) -> PathBuf {
    staging_base(destination).join(attempt)
}

/// A ConfigMap or Secret without revision suffix, copied verbatim onto disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnrevisionedResource {
    /// Name of the object in the controller's namespace
    pub name: String,
    /// Whether the object may be absent.
    ///
    /// An absent optional resource has its local directory removed; an absent required one
    /// fails the sync pass.
    pub optional: bool,
}

impl UnrevisionedResource {
    /// A resource that must exist
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    /// A resource that may be absent
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }
}

/// Files for every key of a ConfigMap's `data` and `binaryData`.
pub fn config_map_files(cm: &ConfigMap) -> FileSet {
    let perm = ResourceKind::ConfigMap.file_perm();
    let text = cm
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), File::new(v.as_bytes(), perm)));
    let binary = cm
        .binary_data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), File::new(v.0.clone(), perm)));
    text.chain(binary).collect()
}

/// Files for every key of a Secret's `data`.
///
/// `stringData` is write-only and normally never returned by the apiserver, but is honoured if
/// present.
pub fn secret_files(secret: &Secret) -> FileSet {
    let perm = ResourceKind::Secret.file_perm();
    let text = secret
        .string_data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), File::new(v.as_bytes(), perm)));
    let data = secret
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), File::new(v.0.clone(), perm)));
    text.chain(data).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    #[test]
    fn config_map_merges_text_and_binary_data() {
        let cm = ConfigMap {
            data: Some(BTreeMap::from([("ca-bundle.crt".to_string(), "CA".to_string())])),
            binary_data: Some(BTreeMap::from([("blob".to_string(), ByteString(vec![0, 1, 2]))])),
            ..ConfigMap::default()
        };
        let files = config_map_files(&cm);
        assert_eq!(files.len(), 2);
        assert_eq!(files["ca-bundle.crt"], File::new("CA", 0o644));
        assert_eq!(files["blob"], File::new(vec![0, 1, 2], 0o644));
    }

    #[test]
    fn secret_files_are_owner_only() {
        let secret = Secret {
            data: Some(BTreeMap::from([
                ("tls.crt".to_string(), ByteString(b"CERT".to_vec())),
                ("tls.key".to_string(), ByteString(b"KEY".to_vec())),
            ])),
            ..Secret::default()
        };
        let files = secret_files(&secret);
        assert_eq!(files["tls.crt"], File::new("CERT", 0o600));
        assert_eq!(files["tls.key"], File::new("KEY", 0o600));
    }

    #[test]
    fn empty_objects_have_no_files() {
        assert!(config_map_files(&ConfigMap::default()).is_empty());
        assert!(secret_files(&Secret::default()).is_empty());
    }

    #[test]
    fn layout_matches_kind() {
        let dest = Path::new("/etc/kubernetes/static-pod-certs");
        assert_eq!(
            ResourceKind::Secret.content_dir(dest, "serving-cert"),
            Path::new("/etc/kubernetes/static-pod-certs/secrets/serving-cert")
        );
        assert_eq!(
            ResourceKind::ConfigMap.staging_dir(dest, "abc", "ca"),
            Path::new("/etc/kubernetes/static-pod-certs/staging/abc/configmaps/ca")
        );
    }
}
