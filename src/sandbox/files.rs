//! Sandboxed file operations on a server data directory.

use super::FileSandbox;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::{Dir, Metadata};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by [`ServerFilesystem`].
#[derive(Debug, Clone, Error)]
pub enum FileError {
    /// The path does not exist.
    #[error("'{0}' was not found")]
    NotFound(Utf8PathBuf),

    /// The operation would modify the data root itself.
    #[error("refusing to {0} the server data root")]
    RootProtected(&'static str),

    /// A file was expected but the path is a directory.
    #[error("'{0}' is a directory")]
    IsDirectory(Utf8PathBuf),

    /// The underlying filesystem call failed.
    #[error("file operation failed at '{path}': {source}")]
    Io {
        /// Path relative to the data root.
        path: Utf8PathBuf,
        /// Underlying failure.
        source: Arc<io::Error>,
    },
}

impl FileError {
    fn io(path: &Utf8Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return Self::NotFound(path.to_path_buf());
        }
        Self::Io {
            path: path.to_path_buf(),
            source: Arc::new(err),
        }
    }
}

/// Result type for sandboxed file operations.
pub type FileResult<T> = Result<T, FileError>;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

/// Metadata for one file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStat {
    /// Entry name; empty for the data root.
    pub name: String,
    /// Entry kind.
    pub kind: FileKind,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when the platform reports one.
    pub modified: Option<DateTime<Utc>>,
}

impl FileStat {
    fn from_metadata(name: impl Into<String>, metadata: &Metadata) -> Self {
        let kind = if metadata.file_type().is_symlink() {
            FileKind::Symlink
        } else if metadata.is_dir() {
            FileKind::Directory
        } else {
            FileKind::File
        };
        Self {
            name: name.into(),
            kind,
            size: metadata.len(),
            modified: metadata
                .modified()
                .ok()
                .map(|time| DateTime::<Utc>::from(time.into_std())),
        }
    }
}

/// File operations confined to one server's data directory.
#[derive(Debug, Clone)]
pub struct ServerFilesystem {
    sandbox: FileSandbox,
}

impl ServerFilesystem {
    /// Creates a filesystem rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            sandbox: FileSandbox::new(root),
        }
    }

    /// Reads a file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::NotFound`] for missing files and
    /// [`FileError::IsDirectory`] for directories.
    pub async fn read_to_string(&self, path: &str) -> FileResult<String> {
        let relative = self.sandbox.resolve_relative(path);
        self.blocking(move |root| {
            if relative.as_str().is_empty() || root.metadata(&relative).is_ok_and(|m| m.is_dir())
            {
                return Err(FileError::IsDirectory(relative));
            }
            root.read_to_string(&relative)
                .map_err(|err| FileError::io(&relative, err))
        })
        .await
    }

    /// Writes `contents` to a file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::RootProtected`] when `path` resolves to the root.
    pub async fn write(&self, path: &str, contents: Vec<u8>) -> FileResult<()> {
        let relative = self.protected(path, "overwrite")?;
        self.blocking(move |root| {
            if let Some(parent) = relative.parent().filter(|p| !p.as_str().is_empty()) {
                root.create_dir_all(parent)
                    .map_err(|err| FileError::io(parent, err))?;
            }
            root.write(&relative, &contents)
                .map_err(|err| FileError::io(&relative, err))
        })
        .await
    }

    /// Returns metadata for a file or directory.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::NotFound`] when the path does not exist.
    pub async fn stat(&self, path: &str) -> FileResult<FileStat> {
        let relative = self.sandbox.resolve_relative(path);
        self.blocking(move |root| {
            let metadata = if relative.as_str().is_empty() {
                root.dir_metadata()
            } else {
                root.symlink_metadata(&relative)
            }
            .map_err(|err| FileError::io(&relative, err))?;
            Ok(FileStat::from_metadata(
                relative.file_name().unwrap_or_default(),
                &metadata,
            ))
        })
        .await
    }

    /// Lists a directory, directories first, then by name.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::NotFound`] when the directory does not exist.
    pub async fn list(&self, path: &str) -> FileResult<Vec<FileStat>> {
        let relative = self.sandbox.resolve_relative(path);
        self.blocking(move |root| {
            let entries = if relative.as_str().is_empty() {
                root.entries()
            } else {
                root.read_dir(&relative)
            }
            .map_err(|err| FileError::io(&relative, err))?;

            let mut stats = Vec::new();
            for entry_result in entries {
                let entry = entry_result.map_err(|err| FileError::io(&relative, err))?;
                let name = entry
                    .file_name()
                    .map_err(|err| FileError::io(&relative, err))?;
                let metadata = entry
                    .metadata()
                    .map_err(|err| FileError::io(&relative.join(&name), err))?;
                stats.push(FileStat::from_metadata(name, &metadata));
            }
            stats.sort_by(|left, right| {
                (left.kind != FileKind::Directory, &left.name)
                    .cmp(&(right.kind != FileKind::Directory, &right.name))
            });
            Ok(stats)
        })
        .await
    }

    /// Creates directory `name` inside `parent`, including missing parents.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::RootProtected`] when the target is the root.
    pub async fn create_dir(&self, parent: &str, name: &str) -> FileResult<()> {
        let relative = self.protected(&format!("{parent}/{name}"), "create")?;
        self.blocking(move |root| {
            root.create_dir_all(&relative)
                .map_err(|err| FileError::io(&relative, err))
        })
        .await
    }

    /// Renames a file or directory.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::RootProtected`] when either path is the root.
    pub async fn rename(&self, from: &str, to: &str) -> FileResult<()> {
        let source = self.protected(from, "rename")?;
        let target = self.protected(to, "replace")?;
        self.blocking(move |root| {
            if let Some(parent) = target.parent().filter(|p| !p.as_str().is_empty()) {
                root.create_dir_all(parent)
                    .map_err(|err| FileError::io(parent, err))?;
            }
            root.rename(&source, &root, &target)
                .map_err(|err| FileError::io(&source, err))
        })
        .await
    }

    /// Copies a file next to itself as `<stem>-copy[-N].<ext>`.
    ///
    /// Copy names carry no whitespace so they stay addressable through the
    /// sandbox.
    ///
    /// Returns the path of the copy relative to the data root.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::IsDirectory`] for directories.
    pub async fn copy(&self, path: &str) -> FileResult<Utf8PathBuf> {
        let source = self.protected(path, "copy")?;
        self.blocking(move |root| {
            let metadata = root
                .metadata(&source)
                .map_err(|err| FileError::io(&source, err))?;
            if metadata.is_dir() {
                return Err(FileError::IsDirectory(source));
            }

            let target = (1_u32..)
                .map(|attempt| copy_name(&source, attempt))
                .find(|candidate| !root.exists(candidate))
                .ok_or_else(|| FileError::io(&source, io::Error::other("no free copy name")))?;
            root.copy(&source, &root, &target)
                .map_err(|err| FileError::io(&target, err))?;
            Ok(target)
        })
        .await
    }

    /// Deletes a file or a directory tree.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::RootProtected`] when `path` resolves to the root.
    pub async fn delete(&self, path: &str) -> FileResult<()> {
        let relative = self.protected(path, "delete")?;
        self.blocking(move |root| {
            let metadata = root
                .symlink_metadata(&relative)
                .map_err(|err| FileError::io(&relative, err))?;
            if metadata.is_dir() {
                root.remove_dir_all(&relative)
            } else {
                root.remove_file(&relative)
            }
            .map_err(|err| FileError::io(&relative, err))
        })
        .await
    }

    fn protected(&self, path: &str, operation: &'static str) -> FileResult<Utf8PathBuf> {
        let relative = self.sandbox.resolve_relative(path);
        if relative.as_str().is_empty() {
            return Err(FileError::RootProtected(operation));
        }
        Ok(relative)
    }

    async fn blocking<T, F>(&self, operation: F) -> FileResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Dir) -> FileResult<T> + Send + 'static,
    {
        let root = self.sandbox.root().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let dir = Dir::open_ambient_dir(&root, ambient_authority())
                .map_err(|err| FileError::io(Utf8Path::new(""), err))?;
            operation(dir)
        })
        .await
        .map_err(|err| FileError::io(Utf8Path::new(""), io::Error::other(err)))?
    }
}

fn copy_name(source: &Utf8Path, attempt: u32) -> Utf8PathBuf {
    let stem = source.file_stem().unwrap_or_default();
    let suffix = if attempt == 1 {
        "-copy".to_owned()
    } else {
        format!("-copy-{attempt}")
    };
    let name = source.extension().map_or_else(
        || format!("{stem}{suffix}"),
        |extension| format!("{stem}{suffix}.{extension}"),
    );
    source.with_file_name(name)
}
