use std::fmt;

/// Behaviour shared by every record inside a [`Container`](crate::Container).
///
/// Paths are canonical: slash-separated and relative to the container root,
/// regardless of the host platform. `mode` carries permission bits only.
pub trait Entry {
    fn path(&self) -> &str;
    fn set_path(&mut self, path: String);

    fn mode(&self) -> u32;
    fn set_mode(&mut self, mode: u32);

    fn kind(&self) -> EntryKind;
}

/// The kind of a container entry.
///
/// An index is only meaningful together with its kind: file 3 and dir 3 are
/// unrelated entries living in different sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A regular file.
    File,

    /// A directory.
    Dir,

    /// A symbolic link.
    Symlink,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryKind::File    => "file",
            EntryKind::Dir     => "dir",
            EntryKind::Symlink => "symlink",
        })
    }
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// A regular file and its declared size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub path: String,
    pub mode: u32,
    pub size: u64,
}

impl Entry for File {
    fn path(&self) -> &str {
        &self.path
    }

    fn set_path(&mut self, path: String) {
        self.path = path;
    }

    fn mode(&self) -> u32 {
        self.mode
    }

    fn set_mode(&mut self, mode: u32) {
        self.mode = mode;
    }

    fn kind(&self) -> EntryKind {
        EntryKind::File
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o} {} ({} bytes)", self.mode, self.path, self.size)
    }
}

// ---------------------------------------------------------------------------
// Dir
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    pub path: String,
    pub mode: u32,
}

impl Entry for Dir {
    fn path(&self) -> &str {
        &self.path
    }

    fn set_path(&mut self, path: String) {
        self.path = path;
    }

    fn mode(&self) -> u32 {
        self.mode
    }

    fn set_mode(&mut self, mode: u32) {
        self.mode = mode;
    }

    fn kind(&self) -> EntryKind {
        EntryKind::Dir
    }
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o} {}/", self.mode, self.path)
    }
}

// ---------------------------------------------------------------------------
// Symlink
// ---------------------------------------------------------------------------

/// A symbolic link. `dest` is stored verbatim and never validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symlink {
    pub path: String,
    pub mode: u32,
    pub dest: String,
}

impl Entry for Symlink {
    fn path(&self) -> &str {
        &self.path
    }

    fn set_path(&mut self, path: String) {
        self.path = path;
    }

    fn mode(&self) -> u32 {
        self.mode
    }

    fn set_mode(&mut self, mode: u32) {
        self.mode = mode;
    }

    fn kind(&self) -> EntryKind {
        EntryKind::Symlink
    }
}

impl fmt::Display for Symlink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o} {} -> {}", self.mode, self.path, self.dest)
    }
}
