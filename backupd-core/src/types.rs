//! Domain types shared by the daemon and the transfer layer.
//!
//! All path fields use `PathBuf`; event names stay `OsString` because the
//! kernel hands us raw bytes that need not be UTF-8.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TreeError};

// ---------------------------------------------------------------------------
// WatchedTree
// ---------------------------------------------------------------------------

/// The watched directory and its mirror, both absolute.
///
/// Resolved once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedTree {
    source: PathBuf,
    destination: PathBuf,
}

impl WatchedTree {
    /// Canonicalize both roots and check that they are distinct directories.
    pub fn resolve(source: &Path, destination: &Path) -> Result<Self, ConfigError> {
        let source = resolve_dir("source_dir", source)?;
        let destination = resolve_dir("destination_dir", destination)?;
        if source == destination {
            return Err(ConfigError::SameDirectory { path: source });
        }
        Ok(Self {
            source,
            destination,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// `source/<name>`, rejecting anything but a direct child name.
    pub fn source_entry(&self, name: &OsStr) -> Result<PathBuf, TreeError> {
        join_entry(&self.source, name)
    }

    /// `destination/<name>`, rejecting anything but a direct child name.
    pub fn destination_entry(&self, name: &OsStr) -> Result<PathBuf, TreeError> {
        join_entry(&self.destination, name)
    }
}

fn resolve_dir(key: &'static str, path: &Path) -> Result<PathBuf, ConfigError> {
    let resolved = fs::canonicalize(path).map_err(|source| ConfigError::Unresolvable {
        key,
        path: path.to_path_buf(),
        source,
    })?;
    if !resolved.is_dir() {
        return Err(ConfigError::NotADirectory {
            key,
            path: resolved,
        });
    }
    Ok(resolved)
}

fn join_entry(root: &Path, name: &OsStr) -> Result<PathBuf, TreeError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(root.join(part)),
        _ => Err(TreeError::InvalidEntryName {
            name: name.to_os_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

/// What happened to a direct child of the watched directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    MovedIn,
    MovedOut,
    Other,
}

impl ChangeKind {
    /// Kinds whose mirror action is a full copy from the source.
    pub fn is_copy(self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::MovedIn)
    }

    /// Kinds whose mirror action is a removal from the destination.
    pub fn is_removal(self) -> bool {
        matches!(self, Self::Deleted | Self::MovedOut)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::MovedIn => "moved-in",
            Self::MovedOut => "moved-out",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// One decoded notification record. Lives for a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub name: OsString,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, name: impl Into<OsString>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer policy
// ---------------------------------------------------------------------------

/// What the daemon does when mirroring a single event fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPolicy {
    /// Log the failure, count it, and keep running.
    #[default]
    Skip,
    /// Treat the failure as fatal and stop the daemon.
    Abort,
}

impl fmt::Display for TransferPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("skip"),
            Self::Abort => f.write_str("abort"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    /// Fixed roots for name-joining cases; nothing touches the filesystem.
    fn fixed_tree() -> WatchedTree {
        WatchedTree {
            source: PathBuf::from("/tmp/src"),
            destination: PathBuf::from("/tmp/dst"),
        }
    }

    #[rstest]
    #[case("a.txt")]
    #[case(".hidden")]
    #[case("with space")]
    #[case("..double-dot-prefix")]
    fn direct_child_names_join_onto_root(#[case] name: &str) {
        let tree = fixed_tree();
        assert_eq!(
            tree.destination_entry(OsStr::new(name)).expect("valid name"),
            PathBuf::from("/tmp/dst").join(name)
        );
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("nested/file")]
    #[case("/etc/passwd")]
    #[case("trailing/")]
    fn non_child_names_are_rejected(#[case] name: &str) {
        let tree = fixed_tree();
        let err = tree.source_entry(OsStr::new(name)).unwrap_err();
        assert!(matches!(err, TreeError::InvalidEntryName { .. }), "got: {err}");
    }

    #[test]
    fn resolve_canonicalizes_both_roots() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir(dir.path().join("src")).expect("mkdir src");
        fs::create_dir(dir.path().join("dst")).expect("mkdir dst");

        let tree = WatchedTree::resolve(
            &dir.path().join("src/../src"),
            &dir.path().join("dst"),
        )
        .expect("resolve");

        let root = fs::canonicalize(dir.path()).expect("canonicalize");
        assert_eq!(tree.source(), root.join("src"));
        assert_eq!(tree.destination(), root.join("dst"));
        assert!(tree.source().is_absolute());
    }

    #[test]
    fn resolve_rejects_identical_roots() {
        let dir = TempDir::new().expect("tempdir");
        let err = WatchedTree::resolve(dir.path(), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::SameDirectory { .. }), "got: {err}");
    }

    #[test]
    fn resolve_rejects_files_and_missing_paths() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x").expect("write");

        let err = WatchedTree::resolve(&file, dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotADirectory { key: "source_dir", .. }));

        let err = WatchedTree::resolve(dir.path(), &dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ConfigError::Unresolvable { key: "destination_dir", .. }));
    }

    #[test]
    fn copy_and_removal_kinds_are_disjoint() {
        use ChangeKind::*;
        for kind in [Created, Modified, Deleted, MovedIn, MovedOut, Other] {
            assert!(!(kind.is_copy() && kind.is_removal()), "{kind}");
        }
        assert!(!Other.is_copy() && !Other.is_removal());
    }
}
