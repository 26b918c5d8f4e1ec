//! Build configuration: output layout, copy targets and report settings.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::asset_paths::{normalise_relative, validate_file_name};
use crate::bundle::BaseHref;
use crate::error::ConfigError;
use crate::models::AssetCopyTarget;
use crate::report::{DEFAULT_REPORT_TITLE, ReportFormat, ReportOptions};

/// Configuration files searched for in the project root, in order.
pub const DEFAULT_CONFIG_FILES: [&str; 3] = [
  "bundle.config.json",
  "bundle.config.yaml",
  "bundle.config.yml",
];

/// Pipeline configuration. Every field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
  /// Directory the bundle is emitted into, relative to the project root.
  pub output_root: String,
  /// Relative base every emitted reference is rewritten against.
  pub base_href: String,
  /// Origin the app would otherwise be served from; absolute references to it are relocated too.
  pub public_origin: Option<String>,
  /// Opaque files or directories copied verbatim into the output tree.
  pub asset_copy_targets: Vec<AssetCopyTarget>,
  /// Replace destinations that already exist.
  pub overwrite_assets: bool,
  /// Write the bundle composition report.
  pub report_enabled: bool,
  /// Report destination, relative to the project root.
  pub report_output_path: String,
  /// Report document flavour.
  pub report_format: ReportFormat,
  /// Title shown in the report.
  pub report_title: String,
  /// Include brotli sizes of emitted chunks in the report.
  pub compressed_sizes: bool,
  /// Open the report in a browser once written. Off for unattended builds.
  pub open_report: bool,
  /// Stats file written by the bundler, relative to the project root.
  pub bundle_stats_path: String,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      output_root: "dist".into(),
      base_href: "./".into(),
      public_origin: None,
      asset_copy_targets: Vec::new(),
      overwrite_assets: true,
      report_enabled: true,
      report_output_path: "bundle-visualization.html".into(),
      report_format: ReportFormat::Html,
      report_title: DEFAULT_REPORT_TITLE.into(),
      compressed_sizes: false,
      open_report: false,
      bundle_stats_path: "dist/bundle-stats.json".into(),
    }
  }
}

impl PipelineConfig {
  /// Load the first configuration file found in `project_root`.
  ///
  /// When none exists the defaults are used. A file that exists but fails to parse or
  /// validate is an error rather than silently falling back.
  pub fn discover(project_root: &Path) -> Result<Self, ConfigError> {
    for name in DEFAULT_CONFIG_FILES {
      let candidate = project_root.join(name);
      if candidate.is_file() {
        tracing::debug!(path = %candidate.display(), "loading pipeline configuration");
        return Self::from_path(&candidate);
      }
    }

    let config = Self::default();
    config.validate()?;
    Ok(config)
  }

  /// Read and validate configuration from a JSON or YAML file, chosen by extension.
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    let is_yaml = path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let config: Self = if is_yaml {
      serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
      })?
    } else {
      serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
      })?
    };

    config.validate()?;
    Ok(config)
  }

  /// Check every field up front so misconfiguration fails before any file is touched.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.output_root.trim().is_empty() {
      return Err(invalid("output_root", "must not be empty"));
    }

    self.base()?;

    if self.report_enabled && self.report_output_path.trim().is_empty() {
      return Err(invalid(
        "report_output_path",
        "must not be empty while the report is enabled",
      ));
    }

    for (index, target) in self.asset_copy_targets.iter().enumerate() {
      if target.source.as_os_str().is_empty() {
        return Err(invalid(
          "asset_copy_targets",
          format!("target {index} has an empty source"),
        ));
      }
      normalise_relative(&target.destination_dir).map_err(|err| {
        invalid(
          "asset_copy_targets",
          format!("target {} ({}): {err}", index, target.source.display()),
        )
      })?;
      if let Some(rename) = &target.rename {
        validate_file_name(rename).map_err(|err| {
          invalid("asset_copy_targets", format!("target {index}: {err}"))
        })?;
      }
    }

    Ok(())
  }

  /// Parsed base href.
  pub fn base(&self) -> Result<BaseHref, ConfigError> {
    BaseHref::parse(&self.base_href, self.public_origin.as_deref())
  }

  /// Rendering options for the composition report.
  pub fn report_options(&self) -> ReportOptions {
    ReportOptions {
      title: self.report_title.clone(),
      format: self.report_format,
    }
  }
}

impl PipelineConfig {
  /// Output root resolved against the project root.
  pub fn output_root_path(&self, project_root: &Path) -> PathBuf {
    project_root.join(&self.output_root)
  }

  /// Report destination resolved against the project root.
  pub fn report_output_file(&self, project_root: &Path) -> PathBuf {
    project_root.join(&self.report_output_path)
  }

  /// Bundler stats file resolved against the project root.
  pub fn bundle_stats_file(&self, project_root: &Path) -> PathBuf {
    project_root.join(&self.bundle_stats_path)
  }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
  ConfigError::Invalid {
    field,
    reason: reason.into(),
  }
}
