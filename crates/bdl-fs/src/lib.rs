// SPDX-License-Identifier: MIT OR Apache-2.0
//! Atomic write helpers.
//!
//! Writes go to a uniquely named temporary file in the **same directory** as
//! the target (same filesystem, so the final rename is atomic on POSIX), are
//! flushed and fsynced, and then renamed over the target. A reader therefore
//! sees either the old bytes or the new bytes, never a partial write. If
//! anything fails after the temporary is created it is removed on drop.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replace `target` with the given UTF-8 text.
pub fn atomic_write(target: &Path, content: &str) -> io::Result<()> {
    atomic_write_bytes(target, content.as_bytes())
}

/// Atomically replace `target` with the given bytes.
pub fn atomic_write_bytes(target: &Path, content: &[u8]) -> io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    // Rename over the target; on failure the temp file is unlinked on drop.
    temp.persist(target).map_err(|err| err.error)?;
    Ok(())
}

/// Concatenate two fragments with a single joining newline when neither side
/// already provides one. Empty sides never grow a separator.
pub fn join_with_newline(left: &str, right: &str) -> String {
    if left.is_empty() || right.is_empty() {
        return format!("{left}{right}");
    }
    if left.ends_with('\n') || right.starts_with('\n') {
        return format!("{left}{right}");
    }
    format!("{left}\n{right}")
}
