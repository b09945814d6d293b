use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::Path;

use crate::entry::{Dir, Entry, EntryKind, File, Symlink};
use crate::error::LakeError;
use crate::fsx::{join_slashed, FileSystem, OsFs, DIR_MODE, MODE_MASK};

/// An ordered description of a set of files, directories, and symlinks.
///
/// Each sequence keeps traversal order (parents before children), which some
/// consumers rely on: the zip writer pool emits directories first for
/// exactly this reason. Entries are addressed by their index within their own
/// sequence.
///
/// A container is built once, by a walk or an archive listing, and treated as
/// an immutable value afterwards. Pools share it through an `Arc` and only
/// ever read it. `clone()` yields a fully independent copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    pub files:    Vec<File>,
    pub dirs:     Vec<Dir>,
    pub symlinks: Vec<Symlink>,
}

impl Container {
    /// Total size of all files, in bytes.
    pub fn size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// The file at `index`, or [`LakeError::IndexOutOfRange`].
    pub fn file(&self, index: usize) -> Result<&File, LakeError> {
        self.files.get(index).ok_or(LakeError::IndexOutOfRange {
            kind: EntryKind::File,
            index,
        })
    }

    /// Iterate every entry: dirs, then files, then symlinks.
    pub fn entries(&self) -> impl Iterator<Item = &dyn Entry> + '_ {
        self.dirs
            .iter()
            .map(|d| d as &dyn Entry)
            .chain(self.files.iter().map(|f| f as &dyn Entry))
            .chain(self.symlinks.iter().map(|s| s as &dyn Entry))
    }

    /// Visit every entry in [`entries`](Container::entries) order until `f`
    /// breaks.
    pub fn for_each_entry<F>(&self, mut f: F)
    where
        F: FnMut(&dyn Entry) -> ControlFlow<()>,
    {
        for entry in self.entries() {
            if f(entry).is_break() {
                return;
            }
        }
    }

    /// Human-readable entry counts, e.g. `"5 files, 3 dirs, 2 symlinks"`.
    pub fn stats(&self) -> String {
        format!(
            "{} files, {} dirs, {} symlinks",
            self.files.len(),
            self.dirs.len(),
            self.symlinks.len()
        )
    }

    /// Check that `other` describes the same tree: same paths per kind, same
    /// file sizes, same symlink targets. Order and modes are not compared.
    ///
    /// Every difference is reported, not just the first.
    pub fn ensure_equal(&self, other: &Container) -> Result<(), LakeError> {
        let mut problems = Vec::new();

        diff(&self.files, &other.files, &mut problems, |a, b| {
            (a.size != b.size).then(|| format!("{}: {} bytes vs {} bytes", a.path, a.size, b.size))
        });
        diff(&self.dirs, &other.dirs, &mut problems, |_, _| None);
        diff(&self.symlinks, &other.symlinks, &mut problems, |a, b| {
            (a.dest != b.dest).then(|| format!("{}: points to {} vs {}", a.path, a.dest, b.dest))
        });

        if problems.is_empty() {
            Ok(())
        } else {
            Err(LakeError::Mismatch(problems))
        }
    }

    /// Lay the container out under `base`: directories, files truncated to
    /// their declared size, and symlinks where the platform supports them.
    pub fn prepare(&self, base: impl AsRef<Path>) -> Result<(), LakeError> {
        let base = base.as_ref();
        let fs = OsFs;

        fs.mkdir_all(base, DIR_MODE).map_err(LakeError::io("mkdir", base))?;

        for dir in &self.dirs {
            let path = join_slashed(base, &dir.path);
            fs.mkdir_all(&path, dir.mode | 0o700).map_err(LakeError::io("mkdir", &path))?;
        }

        for file in &self.files {
            let path = join_slashed(base, &file.path);
            if let Some(parent) = path.parent() {
                fs.mkdir_all(parent, DIR_MODE).map_err(LakeError::io("mkdir", parent))?;
            }
            let handle = fs
                .create_truncated(&path, file.mode | MODE_MASK)
                .map_err(LakeError::io("create", &path))?;
            handle.set_len(file.size).map_err(LakeError::io("truncate", &path))?;
        }

        for symlink in &self.symlinks {
            let path = join_slashed(base, &symlink.path);
            make_symlink(&symlink.dest, &path).map_err(LakeError::io("symlink", &path))?;
        }

        Ok(())
    }
}

fn diff<T, F>(ours: &[T], theirs: &[T], problems: &mut Vec<String>, compare: F)
where
    T: Entry,
    F: Fn(&T, &T) -> Option<String>,
{
    let by_path: HashMap<&str, &T> = theirs.iter().map(|e| (e.path(), e)).collect();

    for entry in ours {
        match by_path.get(entry.path()) {
            Some(other) => problems.extend(compare(entry, *other)),
            None => problems.push(format!("{} {} is missing", entry.kind(), entry.path())),
        }
    }

    let ours: HashMap<&str, &T> = ours.iter().map(|e| (e.path(), e)).collect();
    for entry in theirs {
        if !ours.contains_key(entry.path()) {
            problems.push(format!("{} {} is unexpected", entry.kind(), entry.path()));
        }
    }
}

#[cfg(unix)]
fn make_symlink(dest: &str, path: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(dest, path)
}

#[cfg(not(unix))]
fn make_symlink(dest: &str, path: &Path) -> std::io::Result<()> {
    tracing::debug!(path = %path.display(), dest, "skipping symlink on this platform");
    Ok(())
}
