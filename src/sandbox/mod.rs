//! Path containment for server data directories.
//!
//! [`FileSandbox`] confines caller-supplied relative paths to a root using
//! purely lexical rules: whitespace is stripped, `.` and `..` are resolved,
//! and both `/` and `\` separate components. A path that would leave the root
//! resolves to the root itself instead of failing. [`ServerFilesystem`]
//! performs file operations on sandboxed paths through a capability handle
//! opened on the root, so symlinks cannot escape it either.

mod files;

pub use files::{FileError, FileKind, FileResult, FileStat, ServerFilesystem};

use camino::{Utf8Path, Utf8PathBuf};

/// Lexically normalizes `path`.
///
/// Resolves `.` and `..` components and treats `\` as a separator. `..`
/// never climbs above the root of an absolute path. An empty relative result
/// is returned as `.`.
#[must_use]
pub fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let unified = path.as_str().replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut components: Vec<&str> = Vec::new();
    for component in unified.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if components.last().is_some_and(|last| *last != "..") {
                    components.pop();
                } else if !absolute {
                    components.push("..");
                }
            }
            name => components.push(name),
        }
    }

    let joined = components.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => Utf8PathBuf::from(format!("/{joined}")),
        (false, true) => Utf8PathBuf::from("."),
        (false, false) => Utf8PathBuf::from(joined),
    }
}

/// Confines relative paths to a data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSandbox {
    root: Utf8PathBuf,
}

impl FileSandbox {
    /// Creates a sandbox rooted at the normalized form of `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        let requested: Utf8PathBuf = root.into();
        Self {
            root: normalize(&requested),
        }
    }

    /// Returns the sandbox root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Resolves `relative` to a path under the root.
    ///
    /// Whitespace is removed from `relative` before joining. A leading
    /// separator is relative to the root. A result outside the root is
    /// replaced by the root itself.
    #[must_use]
    pub fn resolve(&self, relative: &str) -> Utf8PathBuf {
        let stripped: String = relative.chars().filter(|c| !c.is_whitespace()).collect();
        let trimmed = stripped.trim_start_matches(['/', '\\']);
        let candidate = normalize(&self.root.join(trimmed));

        if candidate.starts_with(&self.root) {
            candidate
        } else {
            tracing::debug!(
                root = %self.root,
                requested = relative,
                "path escapes sandbox; using root"
            );
            self.root.clone()
        }
    }

    /// Resolves `relative` and returns it relative to the root.
    ///
    /// The root itself is returned as an empty path.
    #[must_use]
    pub fn resolve_relative(&self, relative: &str) -> Utf8PathBuf {
        let resolved = self.resolve(relative);
        resolved
            .strip_prefix(&self.root)
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default()
    }
}
