use std::collections::HashMap;
use std::fs;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::{DirEntry, WalkBuilder};
use tracing::debug;
use zip::ZipArchive;

use crate::container::Container;
use crate::entry::{Dir, File, Symlink};
use crate::error::LakeError;
use crate::fsx::{DIR_MODE, MODE_MASK};
use crate::pools::has_zip_extension;

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Decides which names make it into a container.
///
/// Called with a single path component (a file or directory name, never a
/// full path). Rejecting a directory prunes everything under it.
///
/// Any `Fn(&str) -> bool + Send + Sync` closure is a filter.
pub trait Filter: Send + Sync {
    fn accepts(&self, name: &str) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn accepts(&self, name: &str) -> bool {
        self(name)
    }
}

/// Accepts everything. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Filter for AllowAll {
    fn accepts(&self, _name: &str) -> bool {
        true
    }
}

/// Skips version-control metadata, desktop clutter, and AppleDouble files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresetFilter;

const PRESET_IGNORED: &[&str] = &[".git", ".hg", ".svn", ".itch", ".DS_Store", "Thumbs.db"];

impl Filter for PresetFilter {
    fn accepts(&self, name: &str) -> bool {
        !(PRESET_IGNORED.contains(&name) || name.starts_with("._"))
    }
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

/// Builds [`Container`]s from directories, zip archives, and single files.
///
/// Created via [`lake::walk()`](crate::walk()). Configure with chained builder
/// methods, then call [`dir`](Walker::dir), [`zip`](Walker::zip), or
/// [`any`](Walker::any).
///
/// # Example
///
/// ```rust,ignore
/// let container = lake::walk()
///     .filter(lake::PresetFilter)
///     .dereference(true)
///     .dir("build/")?;
/// ```
pub struct Walker {
    filter:      Arc<dyn Filter>,
    dereference: bool,
    max_depth:   Option<usize>,
}

impl Default for Walker {
    fn default() -> Self {
        Self {
            filter:      Arc::new(AllowAll),
            dereference: false,
            max_depth:   None,
        }
    }
}

impl Walker {
    // ── Options ───────────────────────────────────────────────────────────

    /// Only keep entries whose every path component `filter` accepts.
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Follow symlinks and record their targets as plain files and
    /// directories. Off by default, in which case symlinks are recorded as
    /// [`Symlink`] entries.
    ///
    /// Only affects [`dir`](Walker::dir): archives store no link targets to
    /// follow.
    pub fn dereference(mut self, yes: bool) -> Self {
        self.dereference = yes;
        self
    }

    /// Maximum traversal depth below the root. `1` means direct children
    /// only. Unlimited by default.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    // ── Execute ───────────────────────────────────────────────────────────

    /// Describe the tree under `root`.
    ///
    /// The root itself is not part of the result. Entries come out
    /// depth-first with siblings sorted by name, so parents always precede
    /// their children.
    ///
    /// # Errors
    ///
    /// [`LakeError::NotADirectory`] if `root` is not a directory, or the
    /// first error hit during traversal.
    pub fn dir(&self, root: impl AsRef<Path>) -> Result<Container, LakeError> {
        let root = root.as_ref();
        let meta = fs::metadata(root).map_err(LakeError::io("stat", root))?;
        if !meta.is_dir() {
            return Err(LakeError::NotADirectory(root.to_path_buf()));
        }

        let filter = Arc::clone(&self.filter);
        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .ignore(false)
            .parents(false)
            .hidden(false)
            .follow_links(self.dereference)
            .same_file_system(false)
            .max_depth(self.max_depth)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                entry.depth() == 0 || filter.accepts(&entry.file_name().to_string_lossy())
            });

        let mut container = Container::default();
        for result in builder.build() {
            let entry = result.map_err(map_ignore_error)?;
            if entry.depth() == 0 {
                continue;
            }
            record(&mut container, root, &entry)?;
        }

        debug!(root = %root.display(), stats = %container.stats(), "walked directory");
        Ok(container)
    }

    /// Describe the contents of a zip archive.
    ///
    /// Directories are taken from explicit `name/` entries and from the
    /// parents of every other entry, since archives often omit them.
    /// Symlinks are recognized by the unix file type stored in the entry's
    /// external attributes. Each sequence is sorted component by component,
    /// which keeps parents ahead of their children.
    pub fn zip<R: Read + Seek>(&self, archive: &mut ZipArchive<R>) -> Result<Container, LakeError> {
        let mut container = Container::default();
        let mut dirs: HashMap<String, u32> = HashMap::new();

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().trim_end_matches('/').to_string();
            if name.is_empty() || !name.split('/').all(|c| self.filter.accepts(c)) {
                continue;
            }

            for parent in ancestors(&name) {
                dirs.entry(parent.to_string()).or_insert(DIR_MODE);
            }

            let unix_mode = entry.unix_mode();
            if entry.is_dir() {
                dirs.insert(name, unix_mode.map_or(DIR_MODE, |m| m & 0o7777));
            } else if unix_mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
                let mut dest = String::new();
                entry.read_to_string(&mut dest).map_err(LakeError::io("read link", &name))?;
                container.symlinks.push(Symlink {
                    path: name,
                    mode: unix_mode.map_or(0o777, |m| m & 0o7777),
                    dest,
                });
            } else {
                container.files.push(File {
                    mode: unix_mode.map_or(MODE_MASK, |m| m & 0o7777),
                    size: entry.size(),
                    path: name,
                });
            }
        }

        container.dirs = dirs.into_iter().map(|(path, mode)| Dir { path, mode }).collect();
        container.dirs.sort_by(|a, b| component_cmp(&a.path, &b.path));
        container.files.sort_by(|a, b| component_cmp(&a.path, &b.path));
        container.symlinks.sort_by(|a, b| component_cmp(&a.path, &b.path));

        debug!(stats = %container.stats(), "walked zip archive");
        Ok(container)
    }

    /// Walk `path` as whatever it is: a directory, a `.zip` archive, or a
    /// single file. A single file yields a one-file container named after
    /// the file, to be read back from its parent directory.
    pub fn any(&self, path: impl AsRef<Path>) -> Result<Container, LakeError> {
        let path = path.as_ref();
        let meta = fs::metadata(path).map_err(LakeError::io("stat", path))?;
        if meta.is_dir() {
            return self.dir(path);
        }

        if has_zip_extension(path) {
            let handle = fs::File::open(path).map_err(LakeError::io("open", path))?;
            let mut archive = ZipArchive::new(BufReader::new(handle))?;
            return self.zip(&mut archive);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LakeError::InvalidPath(path.display().to_string()))?;

        Ok(Container {
            files: vec![File {
                path: name,
                mode: permissions(&meta, MODE_MASK),
                size: meta.len(),
            }],
            ..Container::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Append one walked entry to `container`, in the sequence its type calls
/// for.
fn record(container: &mut Container, root: &Path, entry: &DirEntry) -> Result<(), LakeError> {
    let path = slash_path(root, entry.path())?;
    let ft = match entry.file_type() {
        Some(ft) => ft,
        None     => return Ok(()),
    };
    let meta = entry.metadata().map_err(map_ignore_error)?;

    if ft.is_dir() {
        container.dirs.push(Dir { path, mode: permissions(&meta, DIR_MODE) });
    } else if ft.is_symlink() {
        let dest = fs::read_link(entry.path()).map_err(LakeError::io("read link", entry.path()))?;
        container.symlinks.push(Symlink {
            path,
            mode: permissions(&meta, 0o777),
            dest: dest.to_string_lossy().into_owned(),
        });
    } else if ft.is_file() {
        container.files.push(File {
            path,
            mode: permissions(&meta, MODE_MASK),
            size: meta.len(),
        });
    }
    // Sockets, fifos and devices have no place in a container.

    Ok(())
}

/// `path` relative to `root`, slash-separated.
fn slash_path(root: &Path, path: &Path) -> Result<String, LakeError> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| LakeError::InvalidPath(path.display().to_string()))?;

    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(unix)]
fn permissions(meta: &fs::Metadata, _fallback: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permissions(_meta: &fs::Metadata, fallback: u32) -> u32 {
    fallback
}

/// Every proper ancestor of a slash path, shallowest first.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}

fn component_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    a.split('/').cmp(b.split('/'))
}

// ---------------------------------------------------------------------------
// Map ignore::Error to LakeError
// ---------------------------------------------------------------------------

fn map_ignore_error(e: ignore::Error) -> LakeError {
    match e {
        ignore::Error::WithPath { path, err } => match *err {
            ignore::Error::Io(io_err) => LakeError::io("walk", &path)(io_err),
            other => walk_error(path, other),
        },
        ignore::Error::WithDepth { err, .. } => map_ignore_error(*err),
        ignore::Error::Loop { child, .. } => LakeError::Io {
            op:     "walk",
            path:   child,
            source: io::Error::other("symlink loop"),
        },
        ignore::Error::Io(io_err) => LakeError::io("walk", PathBuf::new())(io_err),
        other => walk_error(PathBuf::new(), other),
    }
}

fn walk_error(path: PathBuf, err: ignore::Error) -> LakeError {
    LakeError::Io { op: "walk", path, source: io::Error::other(err) }
}
