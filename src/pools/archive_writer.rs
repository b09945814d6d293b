use std::io::{self, Seek, Write};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::container::Container;
use crate::error::LakeError;
use crate::traits::{EntryWriter, Pool, ReadSeek, WritablePool};

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// A write-only [`Pool`] serializing a container into a zip archive.
///
/// Entries land in the archive as dirs, then files, then symlinks:
/// directories are written on construction, files as their writers are
/// opened, and symlinks when the pool is closed.
///
/// A zip stream holds one open entry at a time, so a writer keeps the
/// archive locked until it is closed. Opening a second writer on the same
/// thread before closing the first one deadlocks.
pub struct ZipWriterPool<W: Write + Seek> {
    container: Arc<Container>,
    zip:       Mutex<ZipWriter<W>>,
    finished:  bool,
}

impl<W: Write + Seek> ZipWriterPool<W> {
    /// Wrap `zip` and immediately write every directory of `container` as a
    /// stored, zero-length `path/` entry.
    pub fn new(container: Arc<Container>, mut zip: ZipWriter<W>) -> Result<Self, LakeError> {
        for dir in &container.dirs {
            zip.add_directory(format!("{}/", dir.path), stored(dir.mode))?;
        }

        Ok(Self {
            container,
            zip: Mutex::new(zip),
            finished: false,
        })
    }

    /// Write the symlinks, finalize the archive, and hand back the
    /// underlying stream.
    pub fn finish(mut self) -> Result<W, LakeError> {
        self.finalize()?.ok_or(LakeError::Closed)
    }

    /// Runs at most once; later calls return `None`.
    fn finalize(&mut self) -> Result<Option<W>, LakeError> {
        if self.finished {
            return Ok(None);
        }

        let zip = self.zip.get_mut();
        for symlink in &self.container.symlinks {
            zip.add_symlink(symlink.path.clone(), symlink.dest.clone(), stored(symlink.mode))?;
        }
        let inner = zip.finish()?;
        self.finished = true;

        debug!(stats = %self.container.stats(), "zip archive finalized");
        Ok(Some(inner))
    }
}

fn stored(mode: u32) -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(mode)
}

impl<W: Write + Seek + Send> Pool for ZipWriterPool<W> {
    fn size(&self, index: usize) -> u64 {
        self.container.files[index].size
    }

    fn reader(&mut self, _index: usize) -> Result<&mut dyn io::Read, LakeError> {
        Err(LakeError::NotReadable("zip writer pool"))
    }

    fn seekable_reader(&mut self, _index: usize) -> Result<&mut dyn ReadSeek, LakeError> {
        Err(LakeError::NotReadable("zip writer pool"))
    }

    /// Write the symlinks and finalize the archive. Further writers fail.
    fn close(&mut self) -> Result<(), LakeError> {
        self.finalize().map(drop)
    }
}

impl<W: Write + Seek + Send> WritablePool for ZipWriterPool<W> {
    fn writer(&self, index: usize) -> Result<Box<dyn EntryWriter + '_>, LakeError> {
        let file = self.container.file(index)?;
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(file.mode)
            .large_file(file.size >= ZIP64_THRESHOLD);

        let mut zip = self.zip.lock();
        zip.start_file(file.path.as_str(), options)?;
        Ok(Box::new(ZipEntryWriter { zip, path: file.path.clone() }))
    }
}

struct ZipEntryWriter<'a, W: Write + Seek> {
    zip:  MutexGuard<'a, ZipWriter<W>>,
    path: String,
}

impl<W: Write + Seek> Write for ZipEntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.zip.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.zip.flush()
    }
}

impl<W: Write + Seek> EntryWriter for ZipEntryWriter<'_, W> {
    /// The entry itself is finalized by the next `start_file` or by
    /// `finish`; closing only releases the archive lock.
    fn close(mut self: Box<Self>) -> Result<(), LakeError> {
        self.zip.flush().map_err(LakeError::io("flush", &self.path))
    }
}
