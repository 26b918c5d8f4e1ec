//! Loading the stats file an external bundler writes next to its output.
//!
//! The file describes every emitted chunk and the modules bundled into it:
//!
//! ```json
//! {
//!   "chunks": [
//!     {
//!       "id": "index",
//!       "fileName": "assets/index-4f2a.js",
//!       "byteSize": 1000,
//!       "modules": [{ "id": "src/main.js", "size": 640 }, { "id": "src/scene.js" }]
//!     }
//!   ],
//!   "documents": ["index.html", "assets/index-9c1e.css"]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::asset_paths::normalise_relative;
use crate::error::BundlerError;
use crate::hooks::{BundleOutput, Bundler};
use crate::models::{DocumentKind, EmittedDocument, OutputChunk};

const DEFAULT_DOCUMENT: &str = "index.html";

/// Deserialised representation of the bundler stats file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStats {
  /// Emitted chunks.
  #[serde(default)]
  pub chunks: Vec<StatsChunk>,
  /// Emitted text documents, relative to the output root.
  #[serde(default)]
  pub documents: Vec<String>,
}

/// Chunk entry contained within the stats file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsChunk {
  /// Chunk identifier.
  pub id: String,
  /// Emitted file name relative to the output root.
  pub file_name: String,
  /// Chunk size; read from the emitted file when absent.
  #[serde(default)]
  pub byte_size: Option<u64>,
  /// Modules bundled into the chunk.
  #[serde(default)]
  pub modules: Vec<StatsModule>,
}

/// Module entry of a chunk.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsModule {
  /// Module identifier, usually its project-relative path.
  pub id: String,
  /// Rendered size of the module, when the bundler knows it.
  #[serde(default)]
  pub size: Option<u64>,
}

/// Load a bundler stats file from disk.
pub fn load_stats(path: &Path) -> Result<BundleStats> {
  let content = fs::read_to_string(path)
    .with_context(|| format!("bundle stats not found at {}", path.display()))?;
  let stats: BundleStats = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse bundle stats JSON at {}", path.display()))?;
  Ok(stats)
}

/// Bundler adapter reading the output of an external bundler run from its stats file.
#[derive(Debug, Clone)]
pub struct StatsFileBundler {
  stats_path: PathBuf,
  output_root: PathBuf,
}

impl StatsFileBundler {
  /// Adapter for the stats file at `stats_path` describing files below `output_root`.
  pub fn new(stats_path: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
    Self {
      stats_path: stats_path.into(),
      output_root: output_root.into(),
    }
  }

  fn read_output(&self) -> Result<BundleOutput> {
    let stats = load_stats(&self.stats_path)?;

    let chunks = stats
      .chunks
      .into_iter()
      .map(|chunk| self.to_output_chunk(chunk))
      .collect::<Result<Vec<_>>>()?;

    let document_names = if stats.documents.is_empty() {
      let default = self.output_root.join(DEFAULT_DOCUMENT);
      if default.is_file() {
        vec![DEFAULT_DOCUMENT.to_string()]
      } else {
        Vec::new()
      }
    } else {
      stats.documents
    };

    let mut documents = Vec::with_capacity(document_names.len());
    for name in document_names {
      if let Some(document) = self.read_document(&name)? {
        documents.push(document);
      }
    }

    Ok(BundleOutput { chunks, documents })
  }

  fn to_output_chunk(&self, chunk: StatsChunk) -> Result<OutputChunk> {
    let byte_size = match chunk.byte_size {
      Some(size) => size,
      None => {
        let path = self.output_path(&chunk.file_name)?;
        fs::metadata(&path)
          .with_context(|| {
            format!(
              "chunk `{}` has no byteSize and {} is unreadable",
              chunk.id,
              path.display()
            )
          })?
          .len()
      }
    };

    let mut output = OutputChunk::new(chunk.id, chunk.file_name, byte_size);
    for module in chunk.modules {
      output = output.with_module(module.id, module.size);
    }
    Ok(output)
  }

  fn read_document(&self, name: &str) -> Result<Option<EmittedDocument>> {
    let path = self.output_path(name)?;
    let Some(kind) = DocumentKind::from_path(&path) else {
      tracing::warn!(document = name, "skipping document with unsupported extension");
      return Ok(None);
    };
    let contents = fs::read_to_string(&path)
      .with_context(|| format!("failed to read emitted document {}", path.display()))?;
    Ok(Some(EmittedDocument {
      file_name: name.replace('\\', "/"),
      kind,
      contents,
    }))
  }

  fn output_path(&self, relative: &str) -> Result<PathBuf> {
    let relative = normalise_relative(relative).map_err(|err| anyhow!(err))?;
    Ok(self.output_root.join(relative))
  }
}

impl Bundler for StatsFileBundler {
  fn name(&self) -> &str {
    "stats-file"
  }

  fn bundle(&self) -> Result<BundleOutput, BundlerError> {
    let output = self
      .read_output()
      .map_err(|err| BundlerError::new(self.name(), format!("{err:#}")))?;
    tracing::info!(
      stats = %self.stats_path.display(),
      chunks = output.chunks.len(),
      documents = output.documents.len(),
      "loaded bundle output"
    );
    Ok(output)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
  }

  #[test]
  fn reads_chunks_and_documents() {
    let temp = tempdir().unwrap();
    let dist = temp.path().join("dist");
    write_file(&dist.join("assets/index.js"), &"x".repeat(1234));
    write_file(&dist.join("index.html"), r#"<script src="/assets/index.js"></script>"#);
    write_file(
      &dist.join("bundle-stats.json"),
      r#"{
        "chunks": [
          { "id": "index", "fileName": "assets/index.js",
            "modules": [{ "id": "src/main.js", "size": 1000 }, { "id": "src/lazy.js" }] },
          { "id": "vendor", "fileName": "assets/vendor.js", "byteSize": 500 }
        ],
        "documents": ["index.html", "assets/scene.glb"]
      }"#,
    );

    let bundler = StatsFileBundler::new(dist.join("bundle-stats.json"), &dist);
    let output = bundler.bundle().unwrap();

    assert_eq!(output.chunks.len(), 2);
    assert_eq!(output.chunks[0].byte_size, 1234);
    assert_eq!(output.chunks[0].source_module_ids, vec!["src/main.js", "src/lazy.js"]);
    assert_eq!(output.chunks[0].module_sizes.get("src/main.js"), Some(&1000));
    assert_eq!(output.chunks[1].byte_size, 500);
    assert_eq!(output.documents.len(), 1);
    assert_eq!(output.documents[0].kind, DocumentKind::Html);
  }

  #[test]
  fn defaults_to_index_html_when_no_documents_are_listed() {
    let temp = tempdir().unwrap();
    let dist = temp.path().join("dist");
    write_file(&dist.join("index.html"), "<html></html>");
    write_file(&dist.join("stats.json"), r#"{ "chunks": [] }"#);

    let output = StatsFileBundler::new(dist.join("stats.json"), &dist)
      .bundle()
      .unwrap();
    assert_eq!(output.documents[0].file_name, "index.html");
  }

  #[test]
  fn missing_stats_file_is_a_bundler_error() {
    let temp = tempdir().unwrap();
    let err = StatsFileBundler::new(temp.path().join("missing.json"), temp.path())
      .bundle()
      .unwrap_err();
    assert_eq!(err.bundler, "stats-file");
    assert!(err.message.contains("missing.json"));
  }

  #[test]
  fn unsized_chunk_without_file_names_the_chunk() {
    let temp = tempdir().unwrap();
    write_file(
      &temp.path().join("stats.json"),
      r#"{ "chunks": [{ "id": "lazy", "fileName": "assets/lazy.js" }] }"#,
    );
    let err = StatsFileBundler::new(temp.path().join("stats.json"), temp.path())
      .bundle()
      .unwrap_err();
    assert!(err.message.contains("lazy"));
  }
}
