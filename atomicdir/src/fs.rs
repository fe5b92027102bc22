//! The filesystem operations a sync is built from
//!
//! [`sync`](crate::sync()) only touches the disk through [`FileSystem`], so tests can fail any
//! single operation and observe how the orchestrator reacts.
use std::{
    fs::{self, OpenOptions, Permissions},
    io::{self, Write},
    path::Path,
};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use crate::{
    file::{File, FileSet},
    swap::swap_directories,
};

/// Primitive filesystem operations used by [`sync`](crate::sync()).
pub trait FileSystem: Send + Sync {
    /// Create `path` and all missing parents. The leaf directory ends up with exactly `perm`.
    fn mkdir_all(&self, path: &Path, perm: u32) -> io::Result<()>;

    /// Create or truncate the file at `path`, write `content`, and set its mode to `perm`.
    fn write_file(&self, path: &Path, content: &[u8], perm: u32) -> io::Result<()>;

    /// Remove `path` recursively. A missing path is not an error.
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Atomically exchange two existing directories.
    fn swap_directories(&self, first: &Path, second: &Path) -> crate::Result<()>;

    /// Read the regular files directly inside `dir`.
    ///
    /// Returns `None` if `dir` does not exist. Sub-directories and other non-file entries are
    /// skipped.
    fn read_dir_files(&self, dir: &Path) -> io::Result<Option<FileSet>>;
}

/// [`FileSystem`] backed by the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn mkdir_all(&self, path: &Path, perm: u32) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        std::os::unix::fs::DirBuilderExt::mode(&mut builder, perm);
        builder.create(path)?;
        // the requested mode was filtered through the umask
        set_mode(path, perm)
    }

    fn write_file(&self, path: &Path, content: &[u8], perm: u32) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(perm);
        let mut file = options.open(path)?;
        file.write_all(content)?;
        file.sync_all()?;
        set_mode(path, perm)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn swap_directories(&self, first: &Path, second: &Path) -> crate::Result<()> {
        swap_directories(first, second)
    }

    fn read_dir_files(&self, dir: &Path) -> io::Result<Option<FileSet>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let mut files = FileSet::new();
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let content = fs::read(entry.path())?;
            files.insert(name, File::new(content, mode_of(&meta.permissions())));
        }
        Ok(Some(files))
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, perm: u32) -> io::Result<()> {
    fs::set_permissions(path, Permissions::from_mode(perm))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _perm: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn mode_of(perms: &Permissions) -> u32 {
    perms.mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(perms: &Permissions) -> u32 {
    if perms.readonly() { 0o444 } else { 0o644 }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn mkdir_all_applies_exact_mode() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("a/b/c");
        OsFileSystem.mkdir_all(&dir, 0o750).unwrap();
        assert_eq!(fs::metadata(&dir).unwrap().permissions().mode() & 0o7777, 0o750);
        // idempotent on an existing directory
        OsFileSystem.mkdir_all(&dir, 0o700).unwrap();
        assert_eq!(fs::metadata(&dir).unwrap().permissions().mode() & 0o7777, 0o700);
    }

    #[test]
    fn write_file_replaces_content_and_mode() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("tls.key");
        OsFileSystem.write_file(&path, b"first version", 0o644).unwrap();
        OsFileSystem.write_file(&path, b"KEY", 0o600).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"KEY");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o7777, 0o600);
    }

    #[test]
    fn remove_all_tolerates_missing_paths() {
        let root = tempfile::tempdir().unwrap();
        OsFileSystem.remove_all(&root.path().join("nope")).unwrap();
        let dir = root.path().join("x/y");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("f"), "f").unwrap();
        OsFileSystem.remove_all(&root.path().join("x")).unwrap();
        assert!(!root.path().join("x").exists());
    }

    #[test]
    fn read_dir_files_skips_subdirectories() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(OsFileSystem.read_dir_files(&root.path().join("missing")).unwrap(), None);

        OsFileSystem.write_file(&root.path().join("ca.crt"), b"CA", 0o644).unwrap();
        fs::create_dir(root.path().join("nested")).unwrap();
        let files = OsFileSystem.read_dir_files(root.path()).unwrap().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files["ca.crt"], File::new("CA", 0o644));
    }
}
