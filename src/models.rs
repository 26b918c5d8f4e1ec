//! Data structures passed between the bundler, the stager and the reporter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::asset_paths::to_url_path;
use crate::error::PipelineError;

/// One static asset to copy verbatim into the output tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssetCopyTarget {
  /// File or directory to copy, relative to the project root.
  #[serde(alias = "src")]
  pub source: PathBuf,
  /// Directory relative to the output root; empty means the output root itself.
  #[serde(default, alias = "dest")]
  pub destination_dir: String,
  /// Optional replacement for the source file name at the destination.
  #[serde(default)]
  pub rename: Option<String>,
}

impl AssetCopyTarget {
  /// Target copying `source` into `destination_dir` under its own name.
  pub fn new(source: impl Into<PathBuf>, destination_dir: impl Into<String>) -> Self {
    Self {
      source: source.into(),
      destination_dir: destination_dir.into(),
      rename: None,
    }
  }

  /// Copy under a different file name.
  pub fn renamed(mut self, name: impl Into<String>) -> Self {
    self.rename = Some(name.into());
    self
  }
}

/// An emitted output chunk and the modules bundled into it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputChunk {
  /// Stable chunk identifier.
  pub id: String,
  /// File name of the chunk relative to the output root.
  pub file_name: String,
  /// Modules bundled into the chunk, in bundler order.
  pub source_module_ids: Vec<String>,
  /// Rendered byte size per module, where the bundler reported one.
  pub module_sizes: BTreeMap<String, u64>,
  /// Size of the emitted chunk file in bytes.
  pub byte_size: u64,
}

impl OutputChunk {
  /// Create a chunk with no modules.
  pub fn new(id: impl Into<String>, file_name: impl Into<String>, byte_size: u64) -> Self {
    Self {
      id: id.into(),
      file_name: file_name.into(),
      source_module_ids: Vec::new(),
      module_sizes: BTreeMap::new(),
      byte_size,
    }
  }

  /// Append a module, with its size when known.
  pub fn with_module(mut self, id: impl Into<String>, size: Option<u64>) -> Self {
    let id = id.into();
    if let Some(size) = size {
      self.module_sizes.insert(id.clone(), size);
    }
    self.source_module_ids.push(id);
    self
  }
}

/// Kind of text document whose references are rewritten for a relocatable build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
  /// HTML page.
  Html,
  /// Stylesheet.
  Css,
  /// JavaScript module or script.
  Script,
}

impl DocumentKind {
  /// Infer the document kind from a file extension.
  pub fn from_path(path: &Path) -> Option<Self> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
      "html" | "htm" => Some(DocumentKind::Html),
      "css" => Some(DocumentKind::Css),
      "js" | "mjs" | "cjs" => Some(DocumentKind::Script),
      _ => None,
    }
  }
}

/// A text file emitted by the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedDocument {
  /// Path relative to the output root, using forward slashes.
  pub file_name: String,
  /// How references inside the document are located.
  pub kind: DocumentKind,
  /// Document contents.
  pub contents: String,
}

impl EmittedDocument {
  /// Number of directories between the output root and this document.
  pub fn depth(&self) -> usize {
    self
      .file_name
      .replace('\\', "/")
      .split('/')
      .filter(|segment| !segment.is_empty() && *segment != ".")
      .count()
      .saturating_sub(1)
  }
}

/// How a staged file ended up at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
  /// Bytes were copied into place.
  Copied,
  /// The destination already is the source file (hard link or same path).
  Unchanged,
  /// The destination existed and overwriting was disabled.
  Kept,
}

/// A single file placed in the output tree by the stager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedAsset {
  /// Absolute source path.
  pub source: PathBuf,
  /// Absolute destination path inside the output root.
  pub destination: PathBuf,
  /// Size of the staged file in bytes.
  pub bytes: u64,
  /// Outcome of the copy.
  pub status: CopyStatus,
}

/// A copy target that could not be staged.
#[derive(Debug)]
pub struct StageFailure {
  /// Target as declared in configuration.
  pub target: AssetCopyTarget,
  /// Why staging failed.
  pub error: PipelineError,
}

/// Result of staging a set of copy targets.
#[derive(Debug, Default)]
pub struct StageReport {
  /// Files placed in the output tree, in target order.
  pub staged: Vec<StagedAsset>,
  /// Targets that failed, in target order.
  pub failures: Vec<StageFailure>,
}

impl StageReport {
  /// Returns `true` when every target was staged.
  pub fn is_success(&self) -> bool {
    self.failures.is_empty()
  }
}

/// State describing a single build, passed explicitly through each phase.
#[derive(Debug, Clone, Default)]
pub struct BuildManifest {
  /// Absolute output root.
  pub output_root: PathBuf,
  /// Relative base every emitted reference is expressed against.
  pub base_href: String,
  /// Chunks emitted by the bundler.
  pub chunks: Vec<OutputChunk>,
  /// Text documents emitted by the bundler.
  pub documents: Vec<EmittedDocument>,
  /// Assets staged into the output tree.
  pub copied_assets: Vec<StagedAsset>,
}

impl BuildManifest {
  /// Start an empty manifest for a build writing into `output_root`.
  pub fn new(output_root: impl Into<PathBuf>, base_href: impl Into<String>) -> Self {
    Self {
      output_root: output_root.into(),
      base_href: base_href.into(),
      ..Self::default()
    }
  }

  /// Paths of every emitted or staged file relative to the output root.
  pub fn emitted_paths(&self) -> Vec<String> {
    let mut paths: Vec<String> = self
      .chunks
      .iter()
      .map(|chunk| chunk.file_name.replace('\\', "/"))
      .chain(
        self
          .documents
          .iter()
          .map(|document| document.file_name.replace('\\', "/")),
      )
      .chain(self.copied_assets.iter().filter_map(|asset| {
        asset
          .destination
          .strip_prefix(&self.output_root)
          .ok()
          .map(to_url_path)
      }))
      .map(|path| path.trim_start_matches("./").trim_start_matches('/').to_string())
      .collect();
    paths.sort();
    paths.dedup();
    paths
  }
}
