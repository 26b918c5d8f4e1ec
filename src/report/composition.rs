//! Size attribution: splits every chunk's byte size across the modules bundled into it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::PipelineError;
use crate::models::OutputChunk;

/// Identifier of the bucket holding bytes that cannot be attributed to a module.
pub const UNATTRIBUTED_MODULE_ID: &str = "(unattributed)";

const FULL_SHARE_BASIS_POINTS: u64 = 10_000;

/// Size attribution for a whole build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionReport {
  /// Title shown at the top of the rendered report.
  pub title: String,
  /// Sum of every chunk's declared byte size.
  pub total_bytes: u64,
  /// Chunks sorted by identifier.
  pub chunks: Vec<ChunkComposition>,
}

/// Size attribution for one chunk.
///
/// Ordering compares the identifier first, so sorting yields chunks by id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkComposition {
  /// Chunk identifier.
  pub id: String,
  /// Emitted file name relative to the output root.
  pub file_name: String,
  /// Declared chunk size; the module sizes below always add up to it.
  pub byte_size: u64,
  /// Brotli-compressed size of the emitted chunk file, when measured.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub compressed_size: Option<u64>,
  /// Modules sorted by descending size, then identifier; the unattributed bucket comes last.
  pub modules: Vec<ModuleShare>,
  /// Modules the bundler listed without a size.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub unsized_modules: Vec<String>,
}

/// Bytes attributed to a single module within a chunk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleShare {
  /// Module identifier, or [`UNATTRIBUTED_MODULE_ID`].
  pub id: String,
  /// Bytes attributed to the module.
  pub byte_size: u64,
  /// Share of the chunk in hundredths of a percent.
  pub share_basis_points: u64,
  /// `true` for the bucket collecting bytes of unknown origin.
  pub unattributed: bool,
}

impl CompositionReport {
  /// Attribute every chunk's bytes to its modules.
  ///
  /// Fails with [`PipelineError::EmptyManifest`] when there are no chunks.
  pub fn build(title: impl Into<String>, chunks: &[OutputChunk]) -> Result<Self, PipelineError> {
    if chunks.is_empty() {
      return Err(PipelineError::EmptyManifest);
    }

    let mut compositions: Vec<ChunkComposition> = chunks.iter().map(compose_chunk).collect();
    compositions.sort();

    Ok(Self {
      title: title.into(),
      total_bytes: compositions.iter().map(|chunk| chunk.byte_size).sum(),
      chunks: compositions,
    })
  }

  /// Attach measured compressed sizes, keyed by chunk file name.
  pub fn with_compressed_sizes(mut self, sizes: &BTreeMap<String, u64>) -> Self {
    for chunk in &mut self.chunks {
      chunk.compressed_size = sizes.get(&chunk.file_name).copied();
    }
    self
  }
}

/// Attribute a chunk's declared size across its modules.
///
/// Known module sizes are used as-is when they fit; the remainder and every module without a
/// size land in the unattributed bucket. Known sizes larger than the chunk (for example
/// pre-minification lengths) are scaled down with the largest-remainder method so the result
/// still sums to the declared size.
pub fn compose_chunk(chunk: &OutputChunk) -> ChunkComposition {
  let module_ids: BTreeSet<&str> = chunk
    .source_module_ids
    .iter()
    .map(String::as_str)
    .chain(chunk.module_sizes.keys().map(String::as_str))
    .collect();

  let mut sized: Vec<(&str, u64)> = Vec::new();
  let mut unsized_modules: Vec<String> = Vec::new();
  for id in module_ids {
    match chunk.module_sizes.get(id) {
      Some(size) => sized.push((id, *size)),
      None => unsized_modules.push(id.to_string()),
    }
  }

  let known_total: u128 = sized.iter().map(|(_, size)| u128::from(*size)).sum();
  let declared = u128::from(chunk.byte_size);

  let (attributed, remainder) = if known_total <= declared {
    (sized, chunk.byte_size - known_total as u64)
  } else {
    (scale_to_fit(&sized, known_total, chunk.byte_size), 0)
  };

  let mut modules: Vec<ModuleShare> = attributed
    .into_iter()
    .map(|(id, byte_size)| ModuleShare {
      id: id.to_string(),
      byte_size,
      share_basis_points: basis_points(byte_size, chunk.byte_size),
      unattributed: false,
    })
    .collect();
  modules.sort_by(compare_shares);

  if remainder > 0 || !unsized_modules.is_empty() {
    modules.push(ModuleShare {
      id: UNATTRIBUTED_MODULE_ID.to_string(),
      byte_size: remainder,
      share_basis_points: basis_points(remainder, chunk.byte_size),
      unattributed: true,
    });
  }

  ChunkComposition {
    id: chunk.id.clone(),
    file_name: chunk.file_name.clone(),
    byte_size: chunk.byte_size,
    compressed_size: None,
    modules,
    unsized_modules,
  }
}

fn compare_shares(a: &ModuleShare, b: &ModuleShare) -> Ordering {
  b.byte_size.cmp(&a.byte_size).then_with(|| a.id.cmp(&b.id))
}

fn scale_to_fit<'m>(sized: &[(&'m str, u64)], known_total: u128, target: u64) -> Vec<(&'m str, u64)> {
  let target_wide = u128::from(target);
  let mut scaled: Vec<(&str, u64, u128)> = sized
    .iter()
    .map(|(id, size)| {
      let product = u128::from(*size) * target_wide;
      (*id, (product / known_total) as u64, product % known_total)
    })
    .collect();

  let assigned: u64 = scaled.iter().map(|(_, size, _)| *size).sum();
  let leftover = (target - assigned) as usize;

  let mut order: Vec<usize> = (0..scaled.len()).collect();
  order.sort_by(|&a, &b| {
    scaled[b]
      .2
      .cmp(&scaled[a].2)
      .then_with(|| scaled[a].0.cmp(scaled[b].0))
  });
  for &index in order.iter().take(leftover) {
    scaled[index].1 += 1;
  }

  scaled.into_iter().map(|(id, size, _)| (id, size)).collect()
}

fn basis_points(part: u64, whole: u64) -> u64 {
  if whole == 0 {
    return 0;
  }
  (u128::from(part) * u128::from(FULL_SHARE_BASIS_POINTS) / u128::from(whole)) as u64
}

/// Format basis points as a percentage with two decimals, e.g. `1234` → `12.34%`.
pub fn format_share(basis_points: u64) -> String {
  format!("{}.{:02}%", basis_points / 100, basis_points % 100)
}
