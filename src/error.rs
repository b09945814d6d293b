use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::entry::EntryKind;

#[derive(Error, Debug)]
pub enum LakeError {
    // Lookup
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("{kind} index {index} out of range")]
    IndexOutOfRange { kind: EntryKind, index: usize },

    // I/O
    #[error("{op} failed on {}", path.display())]
    Io {
        op:     &'static str,
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed archive")]
    Format(#[from] zip::result::ZipError),

    #[error("{0} is not readable")]
    NotReadable(&'static str),

    // Container validation
    #[error("invalid container, found the following problems:\n{}", join_conflicts(.0))]
    Sanity(Vec<Conflict>),

    #[error("case conflicts found:\n{}", join_conflicts(.0))]
    CaseConflict(Vec<Conflict>),

    #[error("invalid path in container: {0:?}")]
    InvalidPath(String),

    #[error("containers differ:\n{}", .0.join("\n"))]
    Mismatch(Vec<String>),

    // Cache coordinator
    #[error("could not materialize file {index}")]
    Materialize {
        index:  usize,
        #[source]
        source: Arc<LakeError>,
    },

    #[error("cache pool was shut down")]
    Shutdown {
        #[source]
        cause: Arc<LakeError>,
    },

    #[error("closed")]
    Closed,
}

impl LakeError {
    /// Wrap an `io::Error` from `op` on `path`.
    ///
    /// Missing paths become [`LakeError::NotFound`] so callers can tell them
    /// apart from genuine read/write failures without inspecting the source.
    pub fn io(op: &'static str, path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> LakeError {
        let path = path.as_ref().to_path_buf();
        move |source| {
            if source.kind() == io::ErrorKind::NotFound {
                LakeError::NotFound(path)
            } else {
                LakeError::Io { op, path, source }
            }
        }
    }

    /// The path this error occurred at, if applicable.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound(p) | Self::NotADirectory(p) | Self::Io { path: p, .. } => Some(p),
            _ => None,
        }
    }

    /// Whether this error came out of a shut down cache coordinator.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown { .. })
    }

    /// Follow `Shutdown` and `Materialize` wrappers down to the failure
    /// that started it all.
    pub fn root_cause(&self) -> &LakeError {
        match self {
            Self::Shutdown { cause } => cause.root_cause(),
            Self::Materialize { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Two entries that cannot coexist in the same container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub first:       String,
    pub first_kind:  EntryKind,
    pub second:      String,
    pub second_kind: EntryKind,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) conflicts with {} ({})",
            self.first, self.first_kind, self.second, self.second_kind
        )
    }
}

fn join_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
