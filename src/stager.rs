//! Copies opaque static assets (3D scenes, fonts, media) verbatim into the output tree.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use same_file::is_same_file;

use crate::asset_paths::resolve_named;
use crate::error::PipelineError;
use crate::fs::{CopyError, copy_atomic, remove_stale_temp_files};
use crate::hooks::{BuildHook, HookEffect};
use crate::models::{
  AssetCopyTarget, BuildManifest, CopyStatus, StageFailure, StageReport, StagedAsset,
};

/// Stages copy targets into an output root, independently of the bundler's module graph.
#[derive(Debug, Clone)]
pub struct AssetStager {
  project_root: PathBuf,
  output_root: PathBuf,
  overwrite: bool,
}

impl AssetStager {
  /// Stager resolving relative sources against `project_root` and writing below `output_root`.
  pub fn new(project_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
    Self {
      project_root: project_root.into(),
      output_root: output_root.into(),
      overwrite: true,
    }
  }

  /// Whether existing destinations are replaced. Defaults to `true`.
  pub fn overwrite(mut self, overwrite: bool) -> Self {
    self.overwrite = overwrite;
    self
  }

  /// Output root the stager writes into.
  pub fn output_root(&self) -> &Path {
    &self.output_root
  }

  /// Copy every target into the output tree.
  ///
  /// Targets are copied in parallel. A failing target never prevents the remaining targets
  /// from being attempted; the report lists successes and failures in target order.
  pub fn stage(&self, targets: &[AssetCopyTarget]) -> StageReport {
    if !targets.is_empty() {
      self.sweep_stale_temp_files();
    }

    let outcomes: Vec<Result<Vec<StagedAsset>, PipelineError>> = targets
      .par_iter()
      .map(|target| self.stage_target(target))
      .collect();

    let mut report = StageReport::default();
    for (target, outcome) in targets.iter().zip(outcomes) {
      match outcome {
        Ok(staged) => {
          for asset in &staged {
            tracing::info!(
              source = %asset.source.display(),
              destination = %asset.destination.display(),
              bytes = asset.bytes,
              status = ?asset.status,
              "staged asset"
            );
          }
          report.staged.extend(staged);
        }
        Err(error) => {
          tracing::error!(
            source = %target.source.display(),
            error = %error,
            "failed to stage asset"
          );
          report.failures.push(StageFailure {
            target: target.clone(),
            error,
          });
        }
      }
    }
    report
  }

  fn sweep_stale_temp_files(&self) {
    match remove_stale_temp_files(&self.output_root) {
      Ok(0) => {}
      Ok(removed) => tracing::info!(
        output_root = %self.output_root.display(),
        removed,
        "removed files left by interrupted copies"
      ),
      Err(err) => tracing::warn!(
        output_root = %self.output_root.display(),
        error = %err,
        "failed to remove files left by interrupted copies"
      ),
    }
  }

  fn stage_target(&self, target: &AssetCopyTarget) -> Result<Vec<StagedAsset>, PipelineError> {
    let source = self.source_path(&target.source);
    let destination = resolve_named(
      &source,
      &target.destination_dir,
      target.rename.as_deref(),
      &self.output_root,
    )?;

    if source.is_dir() {
      self.stage_directory(&source, &destination)
    } else {
      Ok(vec![self.install(&source, &destination)?])
    }
  }

  fn source_path(&self, source: &Path) -> PathBuf {
    if source.is_absolute() {
      source.to_path_buf()
    } else {
      self.project_root.join(source)
    }
  }

  fn stage_directory(
    &self,
    source_dir: &Path,
    destination_dir: &Path,
  ) -> Result<Vec<StagedAsset>, PipelineError> {
    let mut files = Vec::new();
    collect_files(source_dir, Path::new(""), &mut files).map_err(|err| {
      PipelineError::SourceNotFound {
        path: source_dir.to_path_buf(),
        source: err,
      }
    })?;

    files
      .iter()
      .map(|relative| self.install(&source_dir.join(relative), &destination_dir.join(relative)))
      .collect()
  }

  fn install(&self, source: &Path, destination: &Path) -> Result<StagedAsset, PipelineError> {
    let write_error = |err| PipelineError::DestinationWrite {
      path: destination.to_path_buf(),
      source: err,
    };

    if destination.exists() {
      if is_same_file(source, destination).map_err(write_error)? {
        return Ok(staged(source, destination, CopyStatus::Unchanged));
      }
      if !self.overwrite {
        return Ok(staged(source, destination, CopyStatus::Kept));
      }
    }

    let bytes = copy_atomic(source, destination).map_err(|err| match err {
      CopyError::Read(err) => PipelineError::SourceNotFound {
        path: source.to_path_buf(),
        source: err,
      },
      CopyError::Write(err) => write_error(err),
    })?;

    Ok(StagedAsset {
      source: source.to_path_buf(),
      destination: destination.to_path_buf(),
      bytes,
      status: CopyStatus::Copied,
    })
  }
}

fn staged(source: &Path, destination: &Path, status: CopyStatus) -> StagedAsset {
  let bytes = fs::metadata(destination).map(|meta| meta.len()).unwrap_or(0);
  StagedAsset {
    source: source.to_path_buf(),
    destination: destination.to_path_buf(),
    bytes,
    status,
  }
}

/// Collect every file below `dir`, relative to the directory staging started from, sorted.
fn collect_files(dir: &Path, relative_root: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
  let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
  entries.sort_by_key(|entry| entry.file_name());

  for entry in entries {
    let path = entry.path();
    let relative = relative_root.join(entry.file_name());
    if path.is_dir() {
      collect_files(&path, &relative, files)?;
    } else if path.is_file() {
      files.push(relative);
    } else {
      return Err(std::io::Error::new(
        ErrorKind::NotFound,
        format!("{} is not a regular file", path.display()),
      ));
    }
  }
  Ok(())
}

/// Hook staging the configured copy targets when a build starts.
#[derive(Debug, Clone)]
pub struct StaticCopy {
  stager: AssetStager,
  targets: Vec<AssetCopyTarget>,
}

impl StaticCopy {
  /// Stage `targets` with `stager` on every build.
  pub fn new(stager: AssetStager, targets: Vec<AssetCopyTarget>) -> Self {
    Self { stager, targets }
  }
}

impl BuildHook for StaticCopy {
  fn name(&self) -> &str {
    "static-copy"
  }

  fn on_build_start(&self, _manifest: &BuildManifest) -> Result<HookEffect, PipelineError> {
    Ok(HookEffect::Staged(self.stager.stage(&self.targets)))
  }
}
