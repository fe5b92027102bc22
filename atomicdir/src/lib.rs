//! Atomic synchronization of directory contents
//!
//! [`sync()`] makes a directory hold exactly a desired set of files. The new content is fully
//! written to a staging directory first and then swapped into place, so a process reading the
//! directory concurrently (for example a server hot-reloading its TLS material) sees either the
//! previous set of files or the new one, never a mixture.
//!
//! ```no_run
//! use atomicdir::{sync, File, FileSet, OsFileSystem};
//! use std::path::Path;
//!
//! # fn wrapper() -> atomicdir::Result<()> {
//! let mut files = FileSet::new();
//! files.insert("tls.crt".into(), File::new("CERT", 0o600));
//! files.insert("tls.key".into(), File::new("KEY", 0o600));
//!
//! let outcome = sync(
//!     &OsFileSystem,
//!     Path::new("/etc/certs/secrets/serving-cert"),
//!     0o755,
//!     Path::new("/etc/certs/staging/3f1c/secrets/serving-cert"),
//!     &files,
//! )?;
//! if outcome.is_changed() {
//!     println!("certificates rotated");
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
mod file;
pub mod fs;
pub mod swap;
mod sync;

pub use error::{Error, Result};
pub use file::{validate_file_name, validate_file_set, File, FileSet};
pub use fs::{FileSystem, OsFileSystem};
pub use swap::{swap_directories, SwapStrategy};
pub use sync::{sync, SyncOutcome};
