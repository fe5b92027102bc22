//! Atomic exchange of two directories
//!
//! On Linux a single `renameat2(RENAME_EXCHANGE)` swaps both paths in one namespace operation,
//! so neither path is ever missing. Other Unix platforms, and Linux filesystems that reject the
//! exchange flag, fall back to three renames through a temporary sibling:
//! `first -> tmp`, `second -> first`, `tmp -> second`.
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::{debug, warn};

use crate::error::{Error, Result};

// Unique temporary names within a process.
static NEXT_TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// How two directories are exchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapStrategy {
    /// A single `renameat2(2)` call with `RENAME_EXCHANGE` (Linux only).
    Exchange,
    /// Three sequential renames through a temporary sibling of the first directory.
    Rename,
}

impl SwapStrategy {
    /// Pick the best strategy available on this platform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] on platforms without POSIX rename semantics.
    pub fn detect() -> Result<Self> {
        if cfg!(target_os = "linux") {
            Ok(Self::Exchange)
        } else if cfg!(unix) {
            Ok(Self::Rename)
        } else {
            Err(Error::Unsupported)
        }
    }

    /// Exchange the contents of `first` and `second`.
    ///
    /// Both paths must exist and be directories on the same filesystem. Relative paths are
    /// resolved against the current working directory first.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] / [`Error::NotADirectory`] if either endpoint is unusable; nothing is
    ///   modified in that case.
    /// - [`Error::Swap`] if a rename fails. Completed renames are rolled back, so both paths still
    ///   hold their previous trees.
    pub fn swap(self, first: &Path, second: &Path) -> Result<()> {
        let first = resolve(first)?;
        let second = resolve(second)?;
        ensure_dir(&first)?;
        ensure_dir(&second)?;

        match self {
            Self::Exchange => match exchange(&first, &second) {
                Ok(()) => Ok(()),
                Err(err) if exchange_rejected(&err) => {
                    debug!(?first, ?second, %err, "RENAME_EXCHANGE unavailable, swapping through renames");
                    rename_through_temp(&first, &second)
                }
                Err(source) => Err(Error::Swap { first, second, source }),
            },
            Self::Rename => rename_through_temp(&first, &second),
        }
    }
}

/// Exchange two directories with the strategy detected for this platform.
///
/// See [`SwapStrategy::swap`] for the contract.
pub fn swap_directories(first: &Path, second: &Path) -> Result<()> {
    SwapStrategy::detect()?.swap(first, second)
}

fn resolve(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn ensure_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotADirectory {
            path: path.to_path_buf(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::NotFound {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(Error::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(target_os = "linux")]
fn exchange(first: &Path, second: &Path) -> io::Result<()> {
    use rustix::fs::{renameat_with, RenameFlags, CWD};
    renameat_with(CWD, first, CWD, second, RenameFlags::EXCHANGE).map_err(io::Error::from)
}

#[cfg(not(target_os = "linux"))]
fn exchange(_first: &Path, _second: &Path) -> io::Result<()> {
    Err(io::ErrorKind::Unsupported.into())
}

// EINVAL: the filesystem does not implement the flag. ENOSYS: kernel older than 3.15.
fn exchange_rejected(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::Unsupported
    )
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pid = std::process::id();
    let ctr = NEXT_TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.swap-{pid}-{ctr}"))
}

fn rename_through_temp(first: &Path, second: &Path) -> Result<()> {
    let tmp = temp_sibling(first);
    let swap_err = |source| Error::Swap {
        first: first.to_path_buf(),
        second: second.to_path_buf(),
        source,
    };

    fs::rename(first, &tmp).map_err(swap_err)?;

    if let Err(err) = fs::rename(second, first) {
        rollback(&tmp, first);
        return Err(swap_err(err));
    }

    if let Err(err) = fs::rename(&tmp, second) {
        rollback(first, second);
        rollback(&tmp, first);
        return Err(swap_err(err));
    }
    Ok(())
}

fn rollback(from: &Path, to: &Path) {
    if let Err(err) = fs::rename(from, to) {
        warn!(?from, ?to, %err, "failed to roll back partial directory swap");
    }
}
