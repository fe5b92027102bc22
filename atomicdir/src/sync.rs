//! Synchronizing a content directory with a desired [`FileSet`]
use std::{io, path::Path, path::PathBuf};

use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    file::{validate_file_set, FileSet},
    fs::FileSystem,
};

/// The result of a successful [`sync`].
#[derive(Debug)]
pub enum SyncOutcome {
    /// The content directory already held exactly the desired files.
    Unchanged,
    /// The content directory now holds the desired files, and did not before.
    Changed,
    /// The desired files are live, but the staging directory, which now holds the previous
    /// content, could not be removed.
    Leftover {
        /// Whether the live content differs from what was there before
        changed: bool,
        /// The directory left behind
        staging_dir: PathBuf,
        /// Why removing it failed
        source: io::Error,
    },
}

impl SyncOutcome {
    /// Whether the content directory differs from what it held before the sync.
    pub fn is_changed(&self) -> bool {
        match self {
            Self::Unchanged => false,
            Self::Changed => true,
            Self::Leftover { changed, .. } => *changed,
        }
    }
}

/// Make `content_dir` hold exactly `files`, atomically with respect to concurrent readers.
///
/// The sequence is:
///
/// 1. validate every file name (nothing is touched if one is invalid)
/// 2. clear anything left in `staging_dir` by an earlier attempt, then create it, and
///    `content_dir` if it does not exist yet, both with `content_dir_perm`
/// 3. write every file into `staging_dir`
/// 4. swap `content_dir` and `staging_dir`
/// 5. remove `staging_dir`, which now holds the previous content
///
/// The full cycle runs even when the content is already up to date; the returned
/// [`SyncOutcome`] says whether anything changed.
///
/// `staging_dir` must live on the same filesystem as `content_dir`, and must not be used by
/// anything else: whatever it holds is deleted.
///
/// # Errors
///
/// Any error from steps 1-4 leaves `content_dir` exactly as it was. A failure in step 2 or 3
/// may leave `staging_dir` behind for inspection. A failure in step 5 is not an error: the
/// new content is already live, and [`SyncOutcome::Leftover`] is returned instead.
pub fn sync(
    fs: &dyn FileSystem,
    content_dir: &Path,
    content_dir_perm: u32,
    staging_dir: &Path,
    files: &FileSet,
) -> Result<SyncOutcome> {
    validate_file_set(files)?;

    let (exists, changed) = match fs.read_dir_files(content_dir) {
        Ok(Some(current)) => (true, current != *files),
        Ok(None) => (false, true),
        Err(err) => {
            debug!(?content_dir, %err, "failed to read current content, assuming it changed");
            (true, true)
        }
    };

    // stale entries would otherwise be swapped in next to the desired files
    fs.remove_all(staging_dir).map_err(|source| Error::Remove {
        path: staging_dir.to_path_buf(),
        source,
    })?;
    debug!(?staging_dir, "creating staging directory");
    fs.mkdir_all(staging_dir, content_dir_perm)
        .map_err(|source| Error::CreateDir {
            path: staging_dir.to_path_buf(),
            source,
        })?;
    if !exists {
        debug!(?content_dir, "creating content directory");
        fs.mkdir_all(content_dir, content_dir_perm)
            .map_err(|source| Error::CreateDir {
                path: content_dir.to_path_buf(),
                source,
            })?;
    }

    for (name, file) in files {
        let path = staging_dir.join(name);
        debug!(?path, perm = format_args!("{:#o}", file.perm), "writing file");
        fs.write_file(&path, &file.content, file.perm)
            .map_err(|source| Error::WriteFile { path, source })?;
    }

    debug!(?content_dir, ?staging_dir, "swapping directories");
    fs.swap_directories(content_dir, staging_dir)?;

    if let Err(source) = fs.remove_all(staging_dir) {
        warn!(?staging_dir, %source, "new content is live but the previous content could not be removed");
        return Ok(SyncOutcome::Leftover {
            changed,
            staging_dir: staging_dir.to_path_buf(),
            source,
        });
    }

    Ok(if changed {
        SyncOutcome::Changed
    } else {
        SyncOutcome::Unchanged
    })
}
