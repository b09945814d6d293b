use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::casefix::{CaseFix, CaseFixStats};
use crate::container::Container;
use crate::error::LakeError;
use crate::fsx::{join_slashed, FileSystem, OsFs, DIR_MODE, MODE_MASK};
use crate::pools::DISCARD_PATH;
use crate::traits::{CaseFixerPool, EntryWriter, Pool, ReadSeek, TruncatablePool, WritablePool};

// ---------------------------------------------------------------------------
// FsPool
// ---------------------------------------------------------------------------

/// A [`Pool`] backed by a directory tree.
///
/// File `i` lives at `base_path/<container path of i>`. Reads go through a
/// single cached handle (see [`Pool`] for what that implies); writes always
/// create parent directories and replace whatever directory or symlink sits in
/// the way.
///
/// When the base path is [`DISCARD_PATH`], writers accept and drop every byte.
pub struct FsPool {
    container:     Arc<Container>,
    base_path:     PathBuf,
    fs:            Arc<dyn FileSystem>,
    current:       Option<(usize, fs::File)>,
    unique_reader: Option<Box<dyn ReadSeek>>,
}

impl FsPool {
    /// Create a pool reading and writing the container's files under
    /// `base_path`, using the host filesystem.
    pub fn new(container: Arc<Container>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            container,
            base_path:     base_path.into(),
            fs:            Arc::new(OsFs),
            current:       None,
            unique_reader: None,
        }
    }

    // ── Options ───────────────────────────────────────────────────────────

    /// Route every OS operation through `fs` instead of the host filesystem.
    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Serve every read from `reader`, whatever the index.
    ///
    /// Used for single-file containers, where the pool is backed by one
    /// already-open stream rather than a directory. [`Pool::close`] leaves it
    /// open.
    pub fn with_unique_reader(mut self, reader: impl ReadSeek + 'static) -> Self {
        self.unique_reader = Some(Box::new(reader));
        self
    }

    // ── Paths ─────────────────────────────────────────────────────────────

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The slash-separated path of file `index`, relative to the container root.
    pub fn relative_path(&self, index: usize) -> Result<&str, LakeError> {
        Ok(&self.container.file(index)?.path)
    }

    /// The native on-disk path of file `index`.
    pub fn path(&self, index: usize) -> Result<PathBuf, LakeError> {
        Ok(self.disk_path(self.relative_path(index)?))
    }

    fn disk_path(&self, container_path: &str) -> PathBuf {
        join_slashed(&self.base_path, container_path)
    }

    fn is_discard(&self) -> bool {
        self.base_path == Path::new(DISCARD_PATH)
    }

    /// Remove a directory or symlink occupying the spot where a regular file
    /// is about to be created.
    fn clear_conflict(&self, path: &Path) -> Result<(), LakeError> {
        match self.fs.lstat(path) {
            Ok(meta) if meta.is_dir() => {
                self.fs.remove_all(path).map_err(LakeError::io("remove_all", path))
            }
            Ok(meta) if meta.file_type().is_symlink() => {
                self.fs.remove(path).map_err(LakeError::io("remove", path))
            }
            _ => Ok(()),
        }
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), LakeError> {
        match path.parent() {
            Some(parent) => self
                .fs
                .mkdir_all(parent, DIR_MODE)
                .map_err(LakeError::io("mkdir", parent)),
            None => Ok(()),
        }
    }
}

impl Pool for FsPool {
    fn size(&self, index: usize) -> u64 {
        self.container.files[index].size
    }

    fn seekable_reader(&mut self, index: usize) -> Result<&mut dyn ReadSeek, LakeError> {
        if self.unique_reader.is_some() {
            return match self.unique_reader.as_deref_mut() {
                Some(reader) => Ok(reader),
                None => Err(LakeError::Closed),
            };
        }

        let cached = matches!(self.current, Some((i, _)) if i == index);
        if !cached {
            self.close()?;
            let path = self.path(index)?;
            let file = self.fs.open(&path).map_err(LakeError::io("open", &path))?;
            self.current = Some((index, file));
        }

        match self.current.as_mut() {
            Some((_, file)) => Ok(file),
            None => Err(LakeError::Closed),
        }
    }

    fn close(&mut self) -> Result<(), LakeError> {
        // std closes on drop and swallows the result, so there is nothing to
        // surface here.
        self.current = None;
        Ok(())
    }
}

impl WritablePool for FsPool {
    fn writer(&self, index: usize) -> Result<Box<dyn EntryWriter + '_>, LakeError> {
        let file = self.container.file(index)?;
        if self.is_discard() {
            return Ok(Box::new(DiscardWriter(io::sink())));
        }

        let path = self.disk_path(&file.path);
        self.ensure_parent(&path)?;
        self.clear_conflict(&path)?;

        let handle = self
            .fs
            .create_truncated(&path, file.mode | MODE_MASK)
            .map_err(LakeError::io("create", &path))?;

        Ok(Box::new(FileWriter { inner: BufWriter::new(handle), path }))
    }
}

impl TruncatablePool for FsPool {
    fn stat(&self, index: usize) -> Result<fs::Metadata, LakeError> {
        let path = self.path(index)?;
        self.fs.lstat(&path).map_err(LakeError::io("stat", &path))
    }

    fn writer_with_truncate(
        &self,
        index: usize,
        size: u64,
    ) -> Result<Box<dyn EntryWriter + '_>, LakeError> {
        let file = self.container.file(index)?;
        if self.is_discard() {
            return Ok(Box::new(DiscardWriter(io::sink())));
        }

        let path = self.disk_path(&file.path);
        self.ensure_parent(&path)?;

        let mut handle = self
            .fs
            .open_for_resize(&path, file.mode | MODE_MASK)
            .map_err(LakeError::io("open", &path))?;
        handle.set_len(size).map_err(LakeError::io("truncate", &path))?;
        handle
            .seek(SeekFrom::Start(size))
            .map_err(LakeError::io("seek", &path))?;

        Ok(Box::new(FileWriter { inner: BufWriter::new(handle), path }))
    }
}

// ---------------------------------------------------------------------------
// Case reconciliation
// ---------------------------------------------------------------------------

impl CaseFixerPool for FsPool {
    fn fix_existing_case(&self, stats: &mut CaseFixStats) -> Result<(), LakeError> {
        if !self.fs.is_case_insensitive() {
            return Ok(());
        }

        // Shortest first, so every parent is fixed before its children are
        // looked up. Equal lengths fall back to lexical order.
        let mut paths: Vec<String> = self.container.entries().map(|e| e.path().to_string()).collect();
        paths.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        let mut pending: VecDeque<String> = paths.into();

        while let Some(path) = pending.pop_front() {
            let (parent, need) = split_base(&path);
            let have = match self.fs.true_base_name(&self.disk_path(&path)) {
                Some(have) if have != need => have,
                _ => continue,
            };

            let old = match parent {
                Some(parent) => format!("{parent}/{have}"),
                None => have,
            };
            debug!(old = %old, new = %path, "fixing case");

            let (from, to) = (self.disk_path(&old), self.disk_path(&path));
            self.fs.rename(&from, &to).map_err(LakeError::io("rename", &from))?;

            let fix = CaseFix { old, new: path };
            for pending_path in pending.iter_mut() {
                if let Some(rewritten) = fix.apply(pending_path) {
                    debug!(old = %pending_path, new = %rewritten, "cascading case fix");
                    *pending_path = rewritten;
                }
            }
            stats.fixes.push(fix);
        }

        Ok(())
    }
}

/// Split a slash path into its parent (if any) and final segment.
fn split_base(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('/') {
        Some((parent, base)) => (Some(parent), base),
        None => (None, path),
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

struct FileWriter {
    inner: BufWriter<fs::File>,
    path:  PathBuf,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl EntryWriter for FileWriter {
    fn close(mut self: Box<Self>) -> Result<(), LakeError> {
        self.inner.flush().map_err(LakeError::io("flush", &self.path))
    }
}

struct DiscardWriter(io::Sink);

impl Write for DiscardWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl EntryWriter for DiscardWriter {
    fn close(self: Box<Self>) -> Result<(), LakeError> {
        Ok(())
    }
}
