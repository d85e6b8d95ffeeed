// src/fs/file.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::fs::hash::{self, ContentHash};

/// A file inside one of the driver's trees (source or temp), identified by a
/// canonical name relative to the tree root.
///
/// Canonical names always use `/` as separator, never start or end with one,
/// and are what the provider-preference rules compare. The tree root itself
/// has the empty canonical name.
///
/// Handles are cheap to clone; two handles are equal when they refer to the
/// same canonical name under the same root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    root: Arc<PathBuf>,
    rel: String,
}

impl File {
    /// A handle to the root of a tree. The directory does not have to exist
    /// yet (the temp tree is created lazily).
    pub fn tree_root(path: impl Into<PathBuf>) -> Self {
        File {
            root: Arc::new(path.into()),
            rel: String::new(),
        }
    }

    /// Canonical name relative to the tree root, `/`-separated.
    pub fn canonical_name(&self) -> &str {
        &self.rel
    }

    /// Absolute (or root-relative) on-disk path.
    pub fn full_path(&self) -> PathBuf {
        if self.rel.is_empty() {
            self.root.as_ref().clone()
        } else {
            self.root.join(self.rel.replace('/', std::path::MAIN_SEPARATOR_STR))
        }
    }

    pub fn exists(&self) -> bool {
        self.full_path().exists()
    }

    pub fn is_directory(&self) -> bool {
        self.full_path().is_dir()
    }

    /// Resolve a `/`-separated path against this handle. `.` and `..`
    /// segments are folded; resolving above the tree root is an error.
    pub fn relative(&self, path: &str) -> Result<File> {
        let mut segments: Vec<&str> = if self.rel.is_empty() {
            Vec::new()
        } else {
            self.rel.split('/').collect()
        };

        for seg in path.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        bail!("path {path:?} escapes the tree root");
                    }
                }
                other => segments.push(other),
            }
        }

        Ok(File {
            root: Arc::clone(&self.root),
            rel: segments.join("/"),
        })
    }

    /// Parent directory, or `None` at the tree root.
    pub fn parent(&self) -> Option<File> {
        if self.rel.is_empty() {
            return None;
        }
        let rel = match self.rel.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        };
        Some(File {
            root: Arc::clone(&self.root),
            rel,
        })
    }

    /// Create this directory and any missing ancestors.
    pub fn create_directory(&self) -> Result<()> {
        fs::create_dir_all(self.full_path())
            .with_context(|| format!("creating directory {:?}", self.full_path()))
    }

    /// List the entries of this directory as child handles.
    pub fn list(&self) -> Result<Vec<File>> {
        let full = self.full_path();
        let entries = fs::read_dir(&full)
            .with_context(|| format!("listing directory {full:?}"))?;

        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("reading entry of {full:?}"))?;
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(s) => s.to_string(),
                None => {
                    tracing::warn!(path = ?entry.path(), "skipping non-UTF-8 file name");
                    continue;
                }
            };
            let rel = if self.rel.is_empty() {
                name
            } else {
                format!("{}/{}", self.rel, name)
            };
            children.push(File {
                root: Arc::clone(&self.root),
                rel,
            });
        }

        // Stable order so scans behave the same run to run.
        children.sort_by(|a, b| a.rel.cmp(&b.rel));
        Ok(children)
    }

    /// Hash the current file contents. Missing files hash to the distinguished
    /// absent value rather than erroring, so a file deleted between discovery
    /// and hashing cannot poison the tag index.
    pub fn content_hash(&self) -> Result<ContentHash> {
        hash::hash_file(&self.full_path())
    }
}

/// Convert an absolute path into a canonical name under `root`, if it is
/// inside the tree. Separators are normalized to `/`.
pub fn canonical_name_under(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let s = rel.to_string_lossy().replace('\\', "/");
    Some(s)
}

/// Collect every regular file under `root`, in canonical-name order within
/// each directory. The driver registers these as root provisions; dry runs
/// print them without registering anything.
pub fn walk_files(root: &File) -> Result<Vec<File>> {
    let mut queue = vec![root.clone()];
    let mut files = Vec::new();

    while let Some(current) = queue.pop() {
        if current.is_directory() {
            let mut children = current.list()?;
            children.reverse();
            queue.extend(children);
        } else {
            files.push(current);
        }
    }

    Ok(files)
}
