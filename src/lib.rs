//! # lake
//!
//! Describe a tree of files once, then read and write it through
//! interchangeable storage backends.
//!
//! A [`Container`] is the description: ordered files, directories, and
//! symlinks with slash-separated paths, modes, and sizes. A [`Pool`] is
//! indexed byte access to a container's files, backed by a directory
//! ([`FsPool`]), a zip archive ([`ZipPool`], [`ZipWriterPool`]), or a
//! cache in front of another pool ([`CachePool`]).
//!
//! lake does **not** do transfers, progress reporting, or compression of its
//! own. Archive encoding is left to the `zip` crate, and copying between
//! pools is the caller's loop.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lake::{EntryWriter, FsPool, Pool, WritablePool};
//!
//! # fn main() -> Result<(), lake::LakeError> {
//! let container = Arc::new(lake::walk().filter(lake::PresetFilter).dir("assets/")?);
//! container.validate()?;
//! println!("{} ({} bytes)", container.stats(), container.size());
//!
//! let mut source = FsPool::new(Arc::clone(&container), "assets/");
//! let target = FsPool::new(Arc::clone(&container), "mirror/");
//!
//! for index in 0..container.files.len() {
//!     let mut writer = target.writer(index)?;
//!     std::io::copy(source.reader(index)?, &mut writer)
//!         .map_err(lake::LakeError::io("copy", "mirror/"))?;
//!     writer.close()?;
//! }
//! source.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Caching
//!
//! [`CachePool`] sits between a slow source and a writable cache. Workers
//! call [`CachePool::preload`] for the indices they want materialized; each
//! file is copied at most once, and readers block until theirs is ready. The
//! first copy that fails shuts the whole pool down.
//!
//! # Logging
//!
//! lake emits [`tracing`](https://docs.rs/tracing) events (case fixes, cache
//! materialization and shutdown, walk summaries) and installs no
//! subscriber. Hook one up in your application to see them.

#![forbid(unsafe_code)]

pub mod fsx;
pub mod pools;

mod casefix;
mod container;
mod entry;
mod error;
mod sanity;
mod traits;
mod walk;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use casefix::{CaseFix, CaseFixStats};
pub use container::Container;
pub use entry::{Dir, Entry, EntryKind, File, Symlink};
pub use error::{Conflict, LakeError};
pub use fsx::{FileSystem, OsFs};
pub use pools::{CachePool, FsPool, SharedReader, ZipPool, ZipWriterPool};
pub use traits::{CaseFixerPool, EntryWriter, Pool, ReadSeek, TruncatablePool, WritablePool};
pub use walk::{AllowAll, Filter, PresetFilter, Walker};

// ── Entry point ───────────────────────────────────────────────────────────────

/// Create a new [`Walker`] to build a [`Container`] from disk or an archive.
///
/// # Example
///
/// ```rust,no_run
/// let container = lake::walk()
///     .filter(lake::PresetFilter)
///     .any("game.zip")
///     .unwrap();
///
/// println!("{}", container.stats());
/// ```
pub fn walk() -> Walker {
    Walker::default()
}
