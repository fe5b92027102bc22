//! Desired file contents and file name validation
use std::{collections::BTreeMap, fmt, path::MAIN_SEPARATOR};

use crate::error::{Error, Result};

/// The full content and permission bits of a single file.
///
/// Files are never patched: a sync always replaces the whole content.
#[derive(Clone, PartialEq, Eq)]
pub struct File {
    /// Raw bytes of the file
    pub content: Vec<u8>,
    /// POSIX permission bits, e.g. `0o600`
    pub perm: u32,
}

impl File {
    /// Construct a file from its content and permission bits
    pub fn new(content: impl Into<Vec<u8>>, perm: u32) -> Self {
        Self {
            content: content.into(),
            perm,
        }
    }
}

// Certificate material should not end up in logs.
impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("len", &self.content.len())
            .field("perm", &format_args!("{:#o}", self.perm))
            .finish()
    }
}

/// Mapping from plain file name to desired [`File`].
///
/// Ordered so writes and diagnostics happen in a stable order.
pub type FileSet = BTreeMap<String, File>;

/// Check that `name` is a single path segment.
///
/// Names containing a path separator, a NUL byte, or referring to the current
/// or parent directory are rejected rather than resolved.
pub fn validate_file_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "empty name"
    } else if name == "." || name == ".." {
        "refers to a directory"
    } else if name.contains('/') || name.contains(MAIN_SEPARATOR) {
        "contains a path separator"
    } else if name.contains('\0') {
        "contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(Error::InvalidFileName {
        name: name.to_string(),
        reason,
    })
}

/// Validate every key of a [`FileSet`], failing on the first invalid one.
pub fn validate_file_set(files: &FileSet) -> Result<()> {
    files.keys().try_for_each(|name| validate_file_name(name))
}
