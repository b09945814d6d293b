/// One rename performed while reconciling on-disk casing.
///
/// Both paths are slash-separated and relative to the pool's base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseFix {
    /// The path as it was found on disk.
    pub old: String,

    /// The canonical path it was renamed to.
    pub new: String,
}

impl CaseFix {
    /// Rewrite `path` if it is `old` itself or lives under `old/`.
    ///
    /// Returns `None` when the fix does not affect `path`.
    pub fn apply(&self, path: &str) -> Option<String> {
        if path == self.old {
            return Some(self.new.clone());
        }

        path.strip_prefix(self.old.as_str())
            .filter(|rest| rest.starts_with('/'))
            .map(|rest| format!("{}{}", self.new, rest))
    }
}

/// Renames applied by a [`CaseFixerPool`](crate::CaseFixerPool) pass, in the
/// order they happened.
///
/// Passed by mutable reference so that fixes applied before a failure are
/// still visible to the caller: a reconciliation pass is not rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFixStats {
    pub fixes: Vec<CaseFix>,
}
