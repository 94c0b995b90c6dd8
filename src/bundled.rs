// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Optionally embedded database resources. With the `bundled` feature
//! the crate ships `data/pci.ids` and `data/pci.ids.bin` inside the
//! library so discovery has a last-resort source on systems without
//! hwdata; without it both accessors return `None` and discovery simply
//! skips those candidates.

use crate::error::Result;
use std::io::Write;
use tempfile::NamedTempFile;

#[cfg(feature = "bundled")]
pub fn bundled_bin() -> Option<&'static [u8]> {
    Some(include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/data/pci.ids.bin"
    )))
}

#[cfg(not(feature = "bundled"))]
pub fn bundled_bin() -> Option<&'static [u8]> {
    None
}

#[cfg(feature = "bundled")]
pub fn bundled_text() -> Option<&'static [u8]> {
    Some(include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/data/pci.ids"
    )))
}

#[cfg(not(feature = "bundled"))]
pub fn bundled_text() -> Option<&'static [u8]> {
    None
}

/// Materialize resource bytes at a mappable path. The returned handle
/// removes the file when dropped, so whoever opens the database from it
/// must own it for as long as the reader lives.
pub fn stage_resource(bytes: &[u8]) -> Result<NamedTempFile> {
    let mut staged = NamedTempFile::new()?;
    staged.write_all(bytes)?;
    staged.flush()?;
    Ok(staged)
}
