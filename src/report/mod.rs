//! Bundle composition reports: how much each source module contributes to each emitted chunk.

mod composition;
mod compression;
mod html;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use composition::{
  ChunkComposition, CompositionReport, ModuleShare, UNATTRIBUTED_MODULE_ID, compose_chunk,
  format_share,
};
pub use compression::{brotli_size, measure_compressed_sizes};
pub use html::{format_bytes, render_html};

use crate::error::PipelineError;
use crate::fs::write_atomic;
use crate::hooks::{BuildHook, HookEffect};
use crate::models::{BuildManifest, OutputChunk};

/// Default title of rendered reports.
pub const DEFAULT_REPORT_TITLE: &str = "Bundle composition";

/// Output document flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
  /// Self-contained HTML page.
  #[default]
  Html,
  /// Raw composition data as pretty-printed JSON.
  Json,
}

/// Rendering options for [`render_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
  /// Report title.
  pub title: String,
  /// Output document flavour.
  pub format: ReportFormat,
}

impl Default for ReportOptions {
  fn default() -> Self {
    Self {
      title: DEFAULT_REPORT_TITLE.into(),
      format: ReportFormat::Html,
    }
  }
}

/// A report written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
  /// Where the report was written.
  pub path: PathBuf,
  /// Size of the written report.
  pub bytes: usize,
  /// Document flavour.
  pub format: ReportFormat,
}

/// Render the default HTML report for `chunks`.
///
/// The output depends only on the contents of `chunks`, not on their order.
pub fn render(chunks: &[OutputChunk]) -> Result<Vec<u8>, PipelineError> {
  let report = CompositionReport::build(DEFAULT_REPORT_TITLE, chunks)?;
  serialise(&report, ReportFormat::Html, Path::new(""))
}

/// Render a report for `chunks` with explicit options.
pub fn render_with(chunks: &[OutputChunk], options: &ReportOptions) -> Result<Vec<u8>, PipelineError> {
  let report = CompositionReport::build(options.title.clone(), chunks)?;
  serialise(&report, options.format, Path::new(""))
}

fn serialise(
  report: &CompositionReport,
  format: ReportFormat,
  path: &Path,
) -> Result<Vec<u8>, PipelineError> {
  let rendered = match format {
    ReportFormat::Html => render_html(report).map(String::into_bytes),
    ReportFormat::Json => serde_json::to_vec_pretty(report),
  };
  rendered.map_err(|err| PipelineError::ReportWrite {
    path: path.to_path_buf(),
    reason: err.to_string(),
  })
}

/// Hook writing the composition report once the bundle has been emitted.
#[derive(Debug, Clone)]
pub struct CompositionReporter {
  output_path: PathBuf,
  options: ReportOptions,
  compressed_sizes: bool,
  open_in_browser: bool,
}

impl CompositionReporter {
  /// Reporter writing to `output_path`.
  pub fn new(output_path: impl Into<PathBuf>, options: ReportOptions) -> Self {
    Self {
      output_path: output_path.into(),
      options,
      compressed_sizes: false,
      open_in_browser: false,
    }
  }

  /// Include brotli sizes of the emitted chunk files.
  pub fn compressed_sizes(mut self, enabled: bool) -> Self {
    self.compressed_sizes = enabled;
    self
  }

  /// Open the report in the system browser after writing it.
  pub fn open_in_browser(mut self, enabled: bool) -> Self {
    self.open_in_browser = enabled;
    self
  }

  /// Build, render and write the report for `manifest`.
  pub fn write_report(&self, manifest: &BuildManifest) -> Result<ReportArtifact, PipelineError> {
    let mut report = CompositionReport::build(self.options.title.clone(), &manifest.chunks)?;
    if self.compressed_sizes {
      let sizes = measure_compressed_sizes(&manifest.output_root, &manifest.chunks);
      report = report.with_compressed_sizes(&sizes);
    }

    let bytes = serialise(&report, self.options.format, &self.output_path)?;
    write_atomic(&self.output_path, &bytes).map_err(|err| PipelineError::ReportWrite {
      path: self.output_path.clone(),
      reason: err.to_string(),
    })?;

    tracing::info!(
      path = %self.output_path.display(),
      chunks = report.chunks.len(),
      total_bytes = report.total_bytes,
      "wrote composition report"
    );

    if self.open_in_browser {
      if let Err(err) = webbrowser::open(&self.output_path.to_string_lossy()) {
        tracing::warn!(path = %self.output_path.display(), error = %err, "failed to open report");
      }
    }

    Ok(ReportArtifact {
      path: self.output_path.clone(),
      bytes: bytes.len(),
      format: self.options.format,
    })
  }
}

impl BuildHook for CompositionReporter {
  fn name(&self) -> &str {
    "composition-report"
  }

  fn on_bundle_generated(&self, manifest: &BuildManifest) -> Result<HookEffect, PipelineError> {
    self.write_report(manifest).map(HookEffect::Reported)
  }
}
