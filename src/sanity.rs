use std::collections::HashMap;

use crate::container::Container;
use crate::entry::{Entry, EntryKind};
use crate::error::{Conflict, LakeError};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------
//
// All checks are pure: they never touch the disk, and they collect every
// problem they find so callers can report them in one go.

impl Container {
    /// Fail if two entries, across files, dirs, and symlinks, share the exact
    /// same path (say, a file and a directory both named `data`).
    pub fn check_sanity(&self) -> Result<(), LakeError> {
        let conflicts = find_conflicts(self, |path| path.to_string());
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(LakeError::Sanity(conflicts))
        }
    }

    /// Fail if two entries have paths that differ only by case, like
    /// `foo/bar` and `FOO/bar`. Such a container cannot be laid out on a
    /// case-insensitive filesystem without one entry clobbering the other.
    ///
    /// Exact duplicates are [`check_sanity`](Container::check_sanity)'s
    /// business and are not reported here.
    pub fn assert_case_insensitive_safe(&self) -> Result<(), LakeError> {
        let conflicts: Vec<Conflict> = find_conflicts(self, |path| path.to_lowercase())
            .into_iter()
            .filter(|c| c.first != c.second)
            .collect();

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(LakeError::CaseConflict(conflicts))
        }
    }

    /// Check that every path is a well-formed relative path that stays inside
    /// the container root, then run [`check_sanity`](Container::check_sanity).
    pub fn validate(&self) -> Result<(), LakeError> {
        if let Some(bad) = self.entries().find(|e| !is_well_formed(e.path())) {
            return Err(LakeError::InvalidPath(bad.path().to_string()));
        }
        self.check_sanity()
    }
}

fn find_conflicts<K>(container: &Container, key: K) -> Vec<Conflict>
where
    K: Fn(&str) -> String,
{
    let mut seen: HashMap<String, (&str, EntryKind)> = HashMap::new();
    let mut conflicts = Vec::new();

    for entry in container.entries() {
        let (path, kind) = (entry.path(), entry.kind());
        if let Some(&(first, first_kind)) = seen.get(&key(path)) {
            conflicts.push(Conflict {
                first: first.to_string(),
                first_kind,
                second: path.to_string(),
                second_kind: kind,
            });
            continue;
        }
        seen.insert(key(path), (path, kind));
    }

    conflicts
}

fn is_well_formed(path: &str) -> bool {
    !path.is_empty()
        && !path.contains('\\')
        && path.split('/').all(|c| !c.is_empty() && c != "." && c != "..")
}
