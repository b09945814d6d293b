//! OS file primitives used by the filesystem pool.
//!
//! Pools never touch `std::fs` directly for anything they mutate; they go
//! through a [`FileSystem`] so callers can swap in instrumented or
//! fault-injecting implementations. Every method has a default backed by
//! `std::fs`, which makes [`OsFs`] an empty impl.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use tracing::warn;

/// Contract for the OS-level operations the pools rely on.
///
/// # Thread Safety
///
/// `Send + Sync` are required: a single instance is shared by every writer a
/// pool hands out.
pub trait FileSystem: Send + Sync {
    /// Open an existing file for reading.
    fn open(&self, path: &Path) -> io::Result<fs::File> {
        fs::File::open(path)
    }

    /// Create `path` (or truncate it to zero) for writing. `mode` only
    /// applies when the file is created, and is subject to the umask.
    fn create_truncated(&self, path: &Path, mode: u32) -> io::Result<fs::File> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        set_create_mode(&mut options, mode);
        options.open(path)
    }

    /// Open `path` for writing without discarding its contents, creating it
    /// if needed.
    fn open_for_resize(&self, path: &Path, mode: u32) -> io::Result<fs::File> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(false);
        set_create_mode(&mut options, mode);
        options.open(path)
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path)
    }

    /// Metadata for `path` itself, without following a trailing symlink.
    fn lstat(&self, path: &Path) -> io::Result<fs::Metadata> {
        fs::symlink_metadata(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    /// Whether paths differing only by case name the same file.
    fn is_case_insensitive(&self) -> bool {
        probe_case_insensitive()
    }

    /// The on-disk spelling of the last segment of `path`, or `None` when no
    /// entry matches it even ignoring case.
    fn true_base_name(&self, path: &Path) -> Option<String> {
        true_base_name(path)
    }
}

/// The host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl FileSystem for OsFs {}

#[cfg(unix)]
fn set_create_mode(options: &mut fs::OpenOptions, mode: u32) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(mode);
}

#[cfg(not(unix))]
fn set_create_mode(_options: &mut fs::OpenOptions, _mode: u32) {}

// ---------------------------------------------------------------------------
// Case sensitivity
// ---------------------------------------------------------------------------

static CASE_INSENSITIVE: OnceLock<bool> = OnceLock::new();

/// Probe the temp directory's filesystem once per process.
///
/// A failed probe is reported and treated as case-sensitive, which turns
/// case reconciliation into a no-op rather than a source of bogus renames.
pub fn probe_case_insensitive() -> bool {
    *CASE_INSENSITIVE.get_or_init(|| match probe() {
        Ok(insensitive) => insensitive,
        Err(err) => {
            warn!(error = %err, "could not probe filesystem case sensitivity, assuming sensitive");
            false
        }
    })
}

fn probe() -> io::Result<bool> {
    let dir = tempfile::Builder::new().prefix("lake-case-probe").tempdir()?;
    fs::File::create(dir.path().join("probe"))?;
    Ok(dir.path().join("PROBE").exists())
}

/// Scan the parent of `path` for its last segment. An exact match wins over
/// a case-insensitive one.
pub fn true_base_name(path: &Path) -> Option<String> {
    let wanted = path.file_name()?.to_string_lossy().into_owned();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let folded = wanted.to_lowercase();
    let mut candidate = None;
    for entry in fs::read_dir(parent).ok()?.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == wanted {
            return Some(name);
        }
        if candidate.is_none() && name.to_lowercase() == folded {
            candidate = Some(name);
        }
    }
    candidate
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Permission bits or'd into every file a pool creates.
pub const MODE_MASK: u32 = 0o644;

/// Mode for directories created on the way to a file.
pub const DIR_MODE: u32 = 0o755;

/// Resolve a slash-separated container path under `base`.
pub fn join_slashed(base: &Path, path: &str) -> std::path::PathBuf {
    path.split('/')
        .filter(|c| !c.is_empty())
        .fold(base.to_path_buf(), |acc, c| acc.join(c))
}
