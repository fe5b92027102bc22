//! Error handling in [`atomicdir`][crate]
use std::{io, path::PathBuf};

use thiserror::Error;

/// Possible errors when synchronizing or swapping directories
#[derive(Error, Debug)]
pub enum Error {
    /// A key of the desired file set is not a plain file name.
    ///
    /// Raised before anything on disk is touched.
    #[error("invalid file name {name:?}: {reason}")]
    InvalidFileName {
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// A directory passed to the swap primitive does not exist.
    #[error("directory {} not found", path.display())]
    NotFound {
        /// The missing directory
        path: PathBuf,
    },

    /// A path exists but is not a directory.
    #[error("{} is not a directory", path.display())]
    NotADirectory {
        /// The offending path
        path: PathBuf,
    },

    /// Directory swapping is not available on this platform.
    #[error("directory swapping is not supported on this platform")]
    Unsupported,

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        /// The directory that could not be created
        path: PathBuf,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// Failed to write a file into the staging directory.
    #[error("failed to write file {}: {source}", path.display())]
    WriteFile {
        /// The file that could not be written
        path: PathBuf,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// Failed to exchange the content and staging directories.
    #[error("failed to swap {} and {}: {source}", first.display(), second.display())]
    Swap {
        /// First directory of the pair
        first: PathBuf,
        /// Second directory of the pair
        second: PathBuf,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// Failed to remove a directory tree.
    #[error("failed to remove {}: {source}", path.display())]
    Remove {
        /// The directory that could not be removed
        path: PathBuf,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// Any other I/O failure, such as resolving a path.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The path involved
        path: PathBuf,
        /// The underlying error
        #[source]
        source: io::Error,
    },
}

/// Convenient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
