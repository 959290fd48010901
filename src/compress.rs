//! Gzip envelope for the source archive.

use std::io::Write;

use flate2::{Compression, GzBuilder};

use crate::error::{BuildError, Result};

/// Compress `data` in one default-level gzip pass.
///
/// The header carries no file name and a zero mtime, so equal input gives
/// equal output.
///
/// # Errors
/// Returns [`BuildError::Io`] if the encoder fails.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| BuildError::io("gzip archive", e))?;
    encoder.finish().map_err(|e| BuildError::io("gzip archive", e))
}
