//! Pool backends, plus [`open`] to pick one for a location on disk.

use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;
use zip::ZipArchive;

use crate::container::Container;
use crate::error::LakeError;
use crate::traits::Pool;

mod archive;
mod archive_writer;
mod cache;
mod filesystem;

pub use self::archive::{ZipPool, SPOOL_MEMORY_LIMIT};
pub use self::archive_writer::ZipWriterPool;
pub use self::cache::{CachePool, SharedReader};
pub use self::filesystem::FsPool;

/// Base path that makes an [`FsPool`] discard everything written to it.
pub const DISCARD_PATH: &str = "/dev/null";

/// Open a read pool over `location`, choosing the backend from what is
/// there:
///
/// - [`DISCARD_PATH`] or a directory: an [`FsPool`] rooted at it.
/// - a file ending in `.zip` (any case): a [`ZipPool`] over the archive.
/// - any other file: a single-file container. The pool is an [`FsPool`]
///   rooted at the file's parent that serves every read from the file
///   itself.
///
/// Fails with [`LakeError::NotFound`] if `location` does not exist.
pub fn open(container: Arc<Container>, location: impl AsRef<Path>) -> Result<Box<dyn Pool>, LakeError> {
    let location = location.as_ref();
    if location == Path::new(DISCARD_PATH) {
        return Ok(Box::new(FsPool::new(container, location)));
    }

    let meta = fs::metadata(location).map_err(LakeError::io("stat", location))?;
    if meta.is_dir() {
        debug!(path = %location.display(), "opening directory pool");
        return Ok(Box::new(FsPool::new(container, location)));
    }

    let handle = fs::File::open(location).map_err(LakeError::io("open", location))?;

    if has_zip_extension(location) {
        debug!(path = %location.display(), "opening zip pool");
        let archive = ZipArchive::new(BufReader::new(handle))?;
        return Ok(Box::new(ZipPool::new(container, archive)?));
    }

    debug!(path = %location.display(), "opening single-file pool");
    let parent = location.parent().unwrap_or_else(|| Path::new(""));
    Ok(Box::new(FsPool::new(container, parent).with_unique_reader(handle)))
}

pub(crate) fn has_zip_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}
