//! Compressed size measurements for emitted chunk files.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use crate::asset_paths::normalise_relative;
use crate::models::OutputChunk;

/// Size of `bytes` after brotli compression at the quality static hosts typically serve.
pub fn brotli_size(bytes: &[u8]) -> io::Result<u64> {
  let mut compressed = Vec::new();
  brotli::BrotliCompress(
    &mut Cursor::new(bytes),
    &mut compressed,
    &brotli::enc::BrotliEncoderParams {
      quality: 11,
      lgwin: 22,
      ..Default::default()
    },
  )?;
  Ok(compressed.len() as u64)
}

/// Measure the brotli size of every chunk file found below `output_root`, keyed by file name.
///
/// Chunks whose files cannot be read are skipped; their report entries simply omit the size.
pub fn measure_compressed_sizes(output_root: &Path, chunks: &[OutputChunk]) -> BTreeMap<String, u64> {
  let mut sizes = BTreeMap::new();
  for chunk in chunks {
    let Ok(relative) = normalise_relative(&chunk.file_name) else {
      tracing::warn!(chunk = %chunk.id, file = %chunk.file_name, "chunk file lies outside the output root");
      continue;
    };
    let path = output_root.join(relative);
    match fs::read(&path).and_then(|bytes| brotli_size(&bytes)) {
      Ok(size) => {
        sizes.insert(chunk.file_name.clone(), size);
      }
      Err(err) => {
        tracing::debug!(chunk = %chunk.id, path = %path.display(), error = %err, "skipping compressed size");
      }
    }
  }
  sizes
}
