// src/fs/hash.rs

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

/// Content hash of a file at a point in time.
///
/// Opaque and comparable; the only distinguished value is [`ContentHash::absent`],
/// used for files that did not exist when they were hashed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// The hash recorded for a file that does not exist on disk.
    pub fn absent() -> Self {
        ContentHash([0u8; 32])
    }

    pub fn is_absent(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_absent() {
            f.write_str("ContentHash(absent)")
        } else {
            write!(f, "ContentHash({}..)", &self.to_hex()[..12])
        }
    }
}

/// Hash the contents of a single file with blake3.
///
/// A missing file yields [`ContentHash::absent`]; other I/O failures are
/// surfaced as errors.
pub fn hash_file(path: &Path) -> Result<ContentHash> {
    if !path.is_file() {
        return Ok(ContentHash::absent());
    }

    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {path:?}"))?;

    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {path:?}"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let hash = ContentHash(*hasher.finalize().as_bytes());
    debug!(path = ?path, hash = %hash.to_hex(), "hashed file contents");
    Ok(hash)
}
