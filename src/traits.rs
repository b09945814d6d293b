use std::fs::Metadata;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::casefix::CaseFixStats;
use crate::error::LakeError;

/// A readable, seekable stream handed out by a [`Pool`].
///
/// Blanket-implemented for every `Read + Seek + Send + Sync` type, so
/// `std::fs::File`, `Cursor<Vec<u8>>`, and spooled temp files all qualify.
pub trait ReadSeek: Read + Seek + Send + Sync {
    /// View this stream as a plain reader.
    fn as_read(&mut self) -> &mut dyn Read;
}

impl<T: Read + Seek + Send + Sync> ReadSeek for T {
    fn as_read(&mut self) -> &mut dyn Read {
        self
    }
}

/// A stream writing one entry into a [`WritablePool`].
///
/// Not required to be `Send`: a writer may hold a lock on its pool (the zip
/// writer pool does), so it should be used and closed on the thread that
/// opened it.
///
/// Dropping a writer without calling [`close`](EntryWriter::close) discards
/// any error the final flush would have reported.
pub trait EntryWriter: Write {
    /// Flush and release the entry, surfacing any deferred write error.
    fn close(self: Box<Self>) -> Result<(), LakeError>;
}

/// Indexed read access to the files of a [`Container`](crate::Container).
///
/// # One reader at a time
///
/// A pool caches a single open reader. Asking for a different index closes
/// the previous one first, and the returned reader borrows the pool mutably,
/// so the borrow checker rules out holding two at once. This makes one pool
/// instance unsuitable for concurrent reads of different files: read-heavy
/// consumers should open independent pools over the same backing store.
///
/// # Thread Safety
///
/// `Send + Sync` are required so pools can sit behind the locks of a
/// [`CachePool`](crate::pools::CachePool) shared between threads.
pub trait Pool: Send + Sync {
    /// Declared size of file `index`, straight from the container.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range, like slice indexing.
    fn size(&self, index: usize) -> u64;

    /// A reader positioned at the start of file `index`.
    fn reader(&mut self, index: usize) -> Result<&mut dyn Read, LakeError> {
        let reader = self.seekable_reader(index)?;
        reader
            .seek(SeekFrom::Start(0))
            .map_err(LakeError::io("seek", format!("file #{index}")))?;
        Ok(reader.as_read())
    }

    /// Like [`reader`](Pool::reader), but seekable and left at whatever
    /// position the cached handle was at. Backends that cannot seek natively
    /// may buffer the whole entry first.
    fn seekable_reader(&mut self, index: usize) -> Result<&mut dyn ReadSeek, LakeError>;

    /// Release the cached reader, if any. The pool stays usable: later calls
    /// simply reopen what they need.
    fn close(&mut self) -> Result<(), LakeError>;
}

/// A [`Pool`] that can also be written to.
pub trait WritablePool: Pool {
    /// A writer for file `index`. The destination is truncated to zero right
    /// away, and ends up exactly as long as what is written before
    /// [`EntryWriter::close`].
    ///
    /// Takes `&self`: writers for different indices may be open at the same
    /// time, unless the backend documents otherwise.
    fn writer(&self, index: usize) -> Result<Box<dyn EntryWriter + '_>, LakeError>;
}

/// A [`WritablePool`] that can resize entries in place.
pub trait TruncatablePool: WritablePool {
    /// On-disk metadata of file `index`.
    fn stat(&self, index: usize) -> Result<Metadata, LakeError>;

    /// Resize file `index` to `size` bytes, keeping whatever prefix already
    /// exists, and return a writer positioned at `size` so the caller can
    /// resume appending.
    fn writer_with_truncate(
        &self,
        index: usize,
        size: u64,
    ) -> Result<Box<dyn EntryWriter + '_>, LakeError>;
}

/// A pool able to repair the on-disk casing of its entries.
pub trait CaseFixerPool {
    /// Rename on-disk entries whose casing differs from the container's.
    ///
    /// Renames are recorded into `stats` as they happen. The pass stops at
    /// the first failed rename and returns its error; fixes applied before
    /// it stay applied and recorded.
    fn fix_existing_case(&self, stats: &mut CaseFixStats) -> Result<(), LakeError>;
}
