// src/tag.rs

//! Tags: the labels that match providers to consumers.
//!
//! A tag is an opaque, ordered, hashable name. Files discovered by the source
//! scan and outputs allocated by actions carry the default tag; actions can
//! attach any further tags to the files they provide.

use std::fmt;

use serde::Deserialize;

/// Name of the well-known default tag carried by every discovered or
/// newly-created file.
const DEFAULT_TAG_NAME: &str = "default";

/// Prefix used by tags that refer to a file by canonical path.
const FILE_TAG_PREFIX: &str = "file:";

/// A semantic label under which files are indexed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// An arbitrary named tag, e.g. `Tag::new("obj")`.
    pub fn new(name: impl Into<String>) -> Self {
        Tag(name.into())
    }

    /// The tag every file receives when it is first registered.
    pub fn default_tag() -> Self {
        Tag(DEFAULT_TAG_NAME.to_string())
    }

    /// The tag under which a file is findable by canonical path, e.g.
    /// `Tag::from_file("foo/a.h")` -> `file:foo/a.h`.
    pub fn from_file(path: &str) -> Self {
        Tag(format!("{FILE_TAG_PREFIX}{path}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_TAG_NAME
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
