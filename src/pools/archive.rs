use std::collections::HashMap;
use std::io::{self, Read, Seek};
use std::sync::Arc;

use tempfile::SpooledTempFile;
use zip::ZipArchive;

use crate::container::Container;
use crate::error::LakeError;
use crate::traits::{Pool, ReadSeek};

/// Entries up to this size are decompressed into memory; larger ones spill
/// to a temporary file.
pub const SPOOL_MEMORY_LIMIT: usize = 4 * 1024 * 1024;

/// A read-only [`Pool`] over a zip archive.
///
/// Decompression is left to the `zip` crate. Since a deflate stream cannot
/// seek, each entry is decompressed in full into a spooled buffer the first
/// time it is requested; that buffer is the pool's single cached reader.
pub struct ZipPool<R: Read + Seek> {
    container: Arc<Container>,
    archive:   ZipArchive<R>,
    /// Archive entry number for each container file, by path.
    entries:   Vec<Option<usize>>,
    current:   Option<(usize, SpooledTempFile)>,
}

impl<R: Read + Seek> ZipPool<R> {
    /// Match every file of `container` to its entry in `archive`.
    ///
    /// Files missing from the archive are not an error here: reading them
    /// fails with [`LakeError::NotFound`] instead.
    pub fn new(container: Arc<Container>, mut archive: ZipArchive<R>) -> Result<Self, LakeError> {
        let mut by_name = HashMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            by_name.insert(entry.name().trim_end_matches('/').to_string(), i);
        }

        let entries = container
            .files
            .iter()
            .map(|f| by_name.get(f.path.as_str()).copied())
            .collect();

        Ok(Self {
            container,
            archive,
            entries,
            current: None,
        })
    }

    /// Decompress file `index` into a fresh spool, rewound to the start.
    fn extract(&mut self, index: usize) -> Result<SpooledTempFile, LakeError> {
        let path = &self.container.file(index)?.path;
        let number = self.entries[index].ok_or_else(|| LakeError::NotFound(path.into()))?;

        let mut entry = self.archive.by_index(number)?;
        let mut spool = SpooledTempFile::new(SPOOL_MEMORY_LIMIT);
        io::copy(&mut entry, &mut spool).map_err(LakeError::io("decompress", path))?;
        spool.rewind().map_err(LakeError::io("seek", path))?;
        Ok(spool)
    }
}

impl<R: Read + Seek + Send + Sync> Pool for ZipPool<R> {
    fn size(&self, index: usize) -> u64 {
        self.container.files[index].size
    }

    fn seekable_reader(&mut self, index: usize) -> Result<&mut dyn ReadSeek, LakeError> {
        let cached = matches!(self.current, Some((i, _)) if i == index);
        if !cached {
            self.close()?;
            let spool = self.extract(index)?;
            self.current = Some((index, spool));
        }

        match self.current.as_mut() {
            Some((_, spool)) => Ok(spool),
            None => Err(LakeError::Closed),
        }
    }

    fn close(&mut self) -> Result<(), LakeError> {
        self.current = None;
        Ok(())
    }
}
