//! Lifecycle protocol between the bundler and the plug-ins that run around it.
//!
//! A [`Bundler`] owns module graph construction and emission. [`BuildHook`] implementations
//! (the asset stager and the composition reporter) are registered with
//! [`crate::builder::BuildPipeline`] and called at two points of every build:
//!
//! * `on_build_start` runs while the bundler is working, so it must only touch files the
//!   bundler never emits;
//! * `on_bundle_generated` runs after every chunk and document has been written.

use crate::asset_paths::normalise_relative;
use crate::error::{BundlerError, PipelineError};
use crate::fs::write_atomic;
use crate::models::{BuildManifest, EmittedDocument, OutputChunk, StageReport};
use crate::report::ReportArtifact;

/// Everything a bundler run produced.
#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
  /// Chunks with their module membership and sizes.
  pub chunks: Vec<OutputChunk>,
  /// Text documents whose references are relocated before emission.
  pub documents: Vec<EmittedDocument>,
}

/// External module bundler driven by the pipeline.
pub trait Bundler {
  /// Name used in logs and errors.
  fn name(&self) -> &str;

  /// Build the module graph and produce chunk metadata and documents.
  fn bundle(&self) -> Result<BundleOutput, BundlerError>;

  /// Write the (relocated) documents of `manifest` into its output root.
  fn emit(&self, manifest: &BuildManifest) -> Result<(), BundlerError> {
    emit_documents(self.name(), manifest)
  }
}

/// What a hook contributed to the build.
#[derive(Debug)]
pub enum HookEffect {
  /// The hook did nothing worth recording.
  None,
  /// Assets were staged into the output tree.
  Staged(StageReport),
  /// A composition report was written.
  Reported(ReportArtifact),
}

/// Plug-in invoked by the pipeline around the bundler's phases.
pub trait BuildHook: Send + Sync {
  /// Name used in logs and in the build outcome.
  fn name(&self) -> &str;

  /// Called once before bundling, concurrently with the bundler.
  fn on_build_start(&self, _manifest: &BuildManifest) -> Result<HookEffect, PipelineError> {
    Ok(HookEffect::None)
  }

  /// Called once after every chunk and document has been emitted.
  fn on_bundle_generated(&self, _manifest: &BuildManifest) -> Result<HookEffect, PipelineError> {
    Ok(HookEffect::None)
  }
}

/// Atomically write every document of `manifest` below its output root.
pub fn emit_documents(bundler: &str, manifest: &BuildManifest) -> Result<(), BundlerError> {
  for document in &manifest.documents {
    let relative = normalise_relative(&document.file_name)
      .map_err(|err| BundlerError::new(bundler, err.to_string()))?;
    let destination = manifest.output_root.join(relative);
    write_atomic(&destination, document.contents.as_bytes()).map_err(|err| {
      BundlerError::new(
        bundler,
        format!("failed to emit {}: {err}", destination.display()),
      )
    })?;
    tracing::debug!(document = %document.file_name, "emitted document");
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::DocumentKind;
  use std::fs;
  use tempfile::tempdir;

  #[test]
  fn emits_documents_below_the_output_root() {
    let temp = tempdir().unwrap();
    let mut manifest = BuildManifest::new(temp.path(), "./");
    manifest.documents.push(EmittedDocument {
      file_name: "pages/about.html".into(),
      kind: DocumentKind::Html,
      contents: "<p>about</p>".into(),
    });

    emit_documents("test", &manifest).unwrap();
    assert_eq!(
      fs::read_to_string(temp.path().join("pages/about.html")).unwrap(),
      "<p>about</p>"
    );
  }

  #[test]
  fn refuses_documents_outside_the_output_root() {
    let temp = tempdir().unwrap();
    let mut manifest = BuildManifest::new(temp.path().join("dist"), "./");
    manifest.documents.push(EmittedDocument {
      file_name: "../escape.html".into(),
      kind: DocumentKind::Html,
      contents: String::new(),
    });

    let err = emit_documents("test", &manifest).unwrap_err();
    assert!(err.message.contains("escape.html"));
    assert!(!temp.path().join("escape.html").exists());
  }
}
