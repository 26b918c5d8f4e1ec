//! Error types shared by the staging, rewriting and reporting phases.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Process exit codes reported by the `bundle-pipeline` binary.
pub mod exit_codes {
  /// Bundling, staging and reporting all succeeded.
  pub const SUCCESS: u8 = 0;
  /// The configuration could not be loaded or failed validation.
  pub const CONFIG_ERROR: u8 = 1;
  /// The bundler failed; nothing after emission was attempted.
  pub const BUNDLER_FAILURE: u8 = 2;
  /// At least one asset copy target failed.
  pub const ASSET_COPY_FAILURE: u8 = 3;
  /// The composition report could not be produced.
  pub const REPORT_FAILURE: u8 = 4;
}

/// Failure raised by a [`crate::hooks::Bundler`] implementation.
#[derive(Debug, Error)]
#[error("bundler `{bundler}` failed: {message}")]
pub struct BundlerError {
  /// Name of the bundler that failed.
  pub bundler: String,
  /// Description of the failure, including the implicated path or module.
  pub message: String,
}

impl BundlerError {
  /// Build an error for the named bundler.
  pub fn new(bundler: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      bundler: bundler.into(),
      message: message.into(),
    }
  }
}

/// Errors produced while staging assets or reporting on a build.
#[derive(Debug, Error)]
pub enum PipelineError {
  /// A path was empty, absolute where it must be relative, or escaped the output root.
  #[error("invalid path {}: {reason}", .path.display())]
  InvalidPath {
    /// Offending path as supplied by the caller.
    path: PathBuf,
    /// Why the path was rejected.
    reason: String,
  },
  /// The asset source is missing or cannot be read.
  #[error("asset source {} is missing or unreadable", .path.display())]
  SourceNotFound {
    /// Source path that could not be read.
    path: PathBuf,
    /// Underlying I/O error.
    #[source]
    source: io::Error,
  },
  /// The destination (or one of its parent directories) could not be written.
  #[error("failed to write {}", .path.display())]
  DestinationWrite {
    /// Destination that could not be written.
    path: PathBuf,
    /// Underlying I/O error.
    #[source]
    source: io::Error,
  },
  /// The bundle manifest has no chunks to report on.
  #[error("bundle manifest contains no chunks to report on")]
  EmptyManifest,
  /// The composition report could not be serialised or written.
  #[error("failed to write composition report {}: {reason}", .path.display())]
  ReportWrite {
    /// Report destination.
    path: PathBuf,
    /// Why writing failed.
    reason: String,
  },
  /// Pass-through failure from the bundler.
  #[error(transparent)]
  Bundler(#[from] BundlerError),
}

/// Coarse classification of a failure, used to pick the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureCategory {
  /// Report generation failed; the build output itself is usable.
  Report,
  /// One or more assets were not staged.
  AssetCopy,
  /// Bundling failed.
  Bundler,
}

impl FailureCategory {
  /// Exit code reported for this category.
  pub fn exit_code(self) -> u8 {
    match self {
      FailureCategory::Report => exit_codes::REPORT_FAILURE,
      FailureCategory::AssetCopy => exit_codes::ASSET_COPY_FAILURE,
      FailureCategory::Bundler => exit_codes::BUNDLER_FAILURE,
    }
  }
}

impl PipelineError {
  /// Category used to derive the exit code of a build that hit this error.
  pub fn category(&self) -> FailureCategory {
    match self {
      PipelineError::InvalidPath { .. }
      | PipelineError::SourceNotFound { .. }
      | PipelineError::DestinationWrite { .. } => FailureCategory::AssetCopy,
      PipelineError::EmptyManifest | PipelineError::ReportWrite { .. } => FailureCategory::Report,
      PipelineError::Bundler(_) => FailureCategory::Bundler,
    }
  }

  pub(crate) fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
    PipelineError::InvalidPath {
      path: path.into(),
      reason: reason.into(),
    }
  }
}

/// Errors raised while loading or validating [`crate::config::PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
  /// Failed to read the configuration file from disk.
  #[error("failed to read {}", .path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: io::Error,
  },
  /// Failed to parse a JSON configuration file.
  #[error("failed to parse {}", .path.display())]
  Json {
    /// Path that caused the error.
    path: PathBuf,
    /// Source parse error.
    #[source]
    source: serde_json::Error,
  },
  /// Failed to parse a YAML configuration file.
  #[error("failed to parse {}", .path.display())]
  Yaml {
    /// Path that caused the error.
    path: PathBuf,
    /// Source parse error.
    #[source]
    source: serde_yaml::Error,
  },
  /// A field holds a value the pipeline cannot work with.
  #[error("invalid `{field}`: {reason}")]
  Invalid {
    /// Name of the rejected field.
    field: &'static str,
    /// Why the value was rejected.
    reason: String,
  },
}
