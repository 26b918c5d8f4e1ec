//! Build orchestrator driving the bundler and the hooks registered around it.

use std::panic;
use std::path::{Path, PathBuf};
use std::thread;

use crate::bundle::{BaseHref, apply_base};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, FailureCategory, PipelineError, exit_codes};
use crate::hooks::{BuildHook, Bundler, HookEffect};
use crate::models::{BuildManifest, StageFailure};
use crate::report::{CompositionReporter, ReportArtifact};
use crate::stager::{AssetStager, StaticCopy};

/// A hook that returned an error. The build carried on without it.
#[derive(Debug)]
pub struct HookFailure {
  /// Name of the failing hook.
  pub hook: String,
  /// What went wrong.
  pub error: PipelineError,
}

/// Everything a completed build produced, including the failures it tolerated.
#[derive(Debug, Default)]
pub struct BuildOutcome {
  /// Final manifest, with relocated documents and staged assets.
  pub manifest: BuildManifest,
  /// Copy targets that could not be staged.
  pub stage_failures: Vec<StageFailure>,
  /// Hooks that failed outright.
  pub hook_failures: Vec<HookFailure>,
  /// Reports written during the build.
  pub reports: Vec<ReportArtifact>,
}

impl BuildOutcome {
  /// Most severe failure category hit by the build, if any.
  pub fn failure_category(&self) -> Option<FailureCategory> {
    let staging = (!self.stage_failures.is_empty()).then_some(FailureCategory::AssetCopy);
    self
      .hook_failures
      .iter()
      .map(|failure| failure.error.category())
      .chain(staging)
      .max()
  }

  /// Process exit code for this outcome.
  pub fn exit_code(&self) -> u8 {
    self
      .failure_category()
      .map_or(exit_codes::SUCCESS, FailureCategory::exit_code)
  }

  fn record(&mut self, hook: String, result: Result<HookEffect, PipelineError>) {
    match result {
      Ok(HookEffect::None) => {}
      Ok(HookEffect::Staged(report)) => {
        self.manifest.copied_assets.extend(report.staged);
        self.stage_failures.extend(report.failures);
      }
      Ok(HookEffect::Reported(artifact)) => self.reports.push(artifact),
      Err(error) => {
        if error.category() == FailureCategory::Report {
          tracing::warn!(hook = %hook, error = %error, "hook failed; build output is unaffected");
        } else {
          tracing::error!(hook = %hook, error = %error, "hook failed");
        }
        self.hook_failures.push(HookFailure { hook, error });
      }
    }
  }
}

#[derive(Clone, Copy)]
enum Phase {
  BuildStart,
  BundleGenerated,
}

/// Runs one bundler with a set of hooks.
///
/// `on_build_start` hooks run on a scoped thread while the bundler works. Documents are
/// relocated against the base href once both have finished, the bundler emits them, and then
/// the `on_bundle_generated` hooks run in registration order.
pub struct BuildPipeline<B: Bundler> {
  bundler: B,
  hooks: Vec<Box<dyn BuildHook>>,
  output_root: PathBuf,
  base: BaseHref,
}

impl<B: Bundler> BuildPipeline<B> {
  /// Pipeline without hooks writing into `output_root`.
  pub fn new(bundler: B, output_root: impl Into<PathBuf>, base: BaseHref) -> Self {
    Self {
      bundler,
      hooks: Vec::new(),
      output_root: output_root.into(),
      base,
    }
  }

  /// Pipeline with the static-copy and composition-report hooks configured by `config`.
  pub fn from_config(
    bundler: B,
    config: &PipelineConfig,
    project_root: &Path,
  ) -> Result<Self, ConfigError> {
    let output_root = config.output_root_path(project_root);
    let mut pipeline = Self::new(bundler, &output_root, config.base()?);

    if !config.asset_copy_targets.is_empty() {
      let stager =
        AssetStager::new(project_root, &output_root).overwrite(config.overwrite_assets);
      pipeline = pipeline.with_hook(StaticCopy::new(stager, config.asset_copy_targets.clone()));
    }

    if config.report_enabled {
      let reporter = CompositionReporter::new(
        config.report_output_file(project_root),
        config.report_options(),
      )
      .compressed_sizes(config.compressed_sizes)
      .open_in_browser(config.open_report);
      pipeline = pipeline.with_hook(reporter);
    }

    Ok(pipeline)
  }

  /// Register a hook. Hooks run in registration order within each phase.
  pub fn with_hook(mut self, hook: impl BuildHook + 'static) -> Self {
    self.hooks.push(Box::new(hook));
    self
  }

  /// Names of the registered hooks.
  pub fn hook_names(&self) -> Vec<&str> {
    self.hooks.iter().map(|hook| hook.name()).collect()
  }

  /// Run a full build.
  ///
  /// A bundler failure aborts the build before emission and no `on_bundle_generated` hook
  /// runs. Hook failures are collected in the outcome instead.
  pub fn run(&self) -> Result<BuildOutcome, PipelineError> {
    let mut outcome = BuildOutcome {
      manifest: BuildManifest::new(&self.output_root, self.base.as_str()),
      ..BuildOutcome::default()
    };

    tracing::info!(
      bundler = self.bundler.name(),
      hooks = self.hooks.len(),
      output_root = %self.output_root.display(),
      "starting build"
    );

    let (bundled, started) = thread::scope(|scope| {
      let hooks = &self.hooks;
      let manifest = &outcome.manifest;
      let start_hooks = scope.spawn(move || run_phase(hooks, manifest, Phase::BuildStart));
      let bundled = self.bundler.bundle();
      match start_hooks.join() {
        Ok(started) => (bundled, started),
        Err(payload) => panic::resume_unwind(payload),
      }
    });

    for (hook, result) in started {
      outcome.record(hook, result);
    }

    let output = bundled.inspect_err(|err| tracing::error!(error = %err, "bundling failed"))?;
    outcome.manifest.chunks = output.chunks;
    outcome.manifest.documents = output.documents;
    outcome.manifest = apply_base(std::mem::take(&mut outcome.manifest), &self.base);

    self.bundler.emit(&outcome.manifest)?;
    tracing::info!(
      chunks = outcome.manifest.chunks.len(),
      documents = outcome.manifest.documents.len(),
      assets = outcome.manifest.copied_assets.len(),
      "bundle emitted"
    );

    for (hook, result) in run_phase(&self.hooks, &outcome.manifest, Phase::BundleGenerated) {
      outcome.record(hook, result);
    }

    match outcome.failure_category() {
      None => tracing::info!("build finished"),
      Some(category) => tracing::warn!(?category, "build finished with failures"),
    }
    Ok(outcome)
  }
}

fn run_phase(
  hooks: &[Box<dyn BuildHook>],
  manifest: &BuildManifest,
  phase: Phase,
) -> Vec<(String, Result<HookEffect, PipelineError>)> {
  hooks
    .iter()
    .map(|hook| {
      tracing::debug!(hook = hook.name(), "running hook");
      let result = match phase {
        Phase::BuildStart => hook.on_build_start(manifest),
        Phase::BundleGenerated => hook.on_bundle_generated(manifest),
      };
      (hook.name().to_string(), result)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::BundlerError;
  use crate::hooks::BundleOutput;
  use crate::models::{AssetCopyTarget, DocumentKind, EmittedDocument, OutputChunk};
  use crate::report::{ReportFormat, ReportOptions};
  use std::fs;
  use std::sync::{Arc, Mutex};
  use tempfile::tempdir;

  struct FakeBundler {
    chunks: Vec<OutputChunk>,
    documents: Vec<EmittedDocument>,
    fail: bool,
  }

  impl FakeBundler {
    fn with_chunks(chunks: Vec<OutputChunk>) -> Self {
      Self {
        chunks,
        documents: vec![EmittedDocument {
          file_name: "index.html".into(),
          kind: DocumentKind::Html,
          contents: r#"<script type="module" src="/assets/index.js"></script>"#.into(),
        }],
        fail: false,
      }
    }

    fn failing() -> Self {
      Self {
        chunks: Vec::new(),
        documents: Vec::new(),
        fail: true,
      }
    }
  }

  impl Bundler for FakeBundler {
    fn name(&self) -> &str {
      "fake"
    }

    fn bundle(&self) -> Result<BundleOutput, BundlerError> {
      if self.fail {
        return Err(BundlerError::new("fake", "cannot resolve module src/missing.js"));
      }
      Ok(BundleOutput {
        chunks: self.chunks.clone(),
        documents: self.documents.clone(),
      })
    }
  }

  struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
  }

  impl BuildHook for Recorder {
    fn name(&self) -> &str {
      "recorder"
    }

    fn on_build_start(&self, manifest: &BuildManifest) -> Result<HookEffect, PipelineError> {
      self
        .events
        .lock()
        .unwrap()
        .push(format!("start:{}", manifest.chunks.len()));
      Ok(HookEffect::None)
    }

    fn on_bundle_generated(&self, manifest: &BuildManifest) -> Result<HookEffect, PipelineError> {
      self
        .events
        .lock()
        .unwrap()
        .push(format!("generated:{}", manifest.chunks.len()));
      Ok(HookEffect::None)
    }
  }

  fn sample_chunks() -> Vec<OutputChunk> {
    vec![
      OutputChunk::new("index", "assets/index.js", 1000).with_module("src/main.js", Some(1000)),
      OutputChunk::new("vendor", "assets/vendor.js", 500).with_module("three", None),
    ]
  }

  fn config_for(targets: Vec<AssetCopyTarget>) -> PipelineConfig {
    PipelineConfig {
      asset_copy_targets: targets,
      report_format: ReportFormat::Json,
      report_output_path: "dist/report.json".into(),
      ..PipelineConfig::default()
    }
  }

  #[test]
  fn full_build_stages_relocates_and_reports() {
    let temp = tempdir().unwrap();
    let project = temp.path();
    fs::create_dir_all(project.join("assets")).unwrap();
    fs::write(project.join("assets/test-scene.glb"), b"glTF-scene").unwrap();

    let config = config_for(vec![AssetCopyTarget::new("assets/test-scene.glb", "assets/")]);
    let pipeline =
      BuildPipeline::from_config(FakeBundler::with_chunks(sample_chunks()), &config, project)
        .unwrap();
    assert_eq!(pipeline.hook_names(), vec!["static-copy", "composition-report"]);

    let outcome = pipeline.run().unwrap();
    assert_eq!(outcome.exit_code(), exit_codes::SUCCESS);
    assert_eq!(
      fs::read(project.join("dist/assets/test-scene.glb")).unwrap(),
      b"glTF-scene"
    );
    assert_eq!(
      fs::read_to_string(project.join("dist/index.html")).unwrap(),
      r#"<script type="module" src="./assets/index.js"></script>"#
    );
    assert_eq!(outcome.reports.len(), 1);
    assert!(project.join("dist/report.json").is_file());
    assert_eq!(outcome.manifest.copied_assets.len(), 1);
  }

  #[test]
  fn bundler_failure_skips_emission_and_reporting() {
    let temp = tempdir().unwrap();
    let config = config_for(Vec::new());
    let pipeline =
      BuildPipeline::from_config(FakeBundler::failing(), &config, temp.path()).unwrap();

    let err = pipeline.run().unwrap_err();
    assert_eq!(err.category(), FailureCategory::Bundler);
    assert_eq!(err.category().exit_code(), exit_codes::BUNDLER_FAILURE);
    assert!(err.to_string().contains("src/missing.js"));
    assert!(!temp.path().join("dist/report.json").exists());
  }

  #[test]
  fn copy_failures_do_not_block_the_report() {
    let temp = tempdir().unwrap();
    let config = config_for(vec![AssetCopyTarget::new("assets/missing.glb", "assets/")]);
    let pipeline = BuildPipeline::from_config(
      FakeBundler::with_chunks(sample_chunks()),
      &config,
      temp.path(),
    )
    .unwrap();

    let outcome = pipeline.run().unwrap();
    assert_eq!(outcome.stage_failures.len(), 1);
    assert_eq!(outcome.exit_code(), exit_codes::ASSET_COPY_FAILURE);
    assert!(temp.path().join("dist/report.json").is_file());
  }

  #[test]
  fn empty_bundles_report_a_non_fatal_failure() {
    let temp = tempdir().unwrap();
    let config = config_for(Vec::new());
    let pipeline =
      BuildPipeline::from_config(FakeBundler::with_chunks(Vec::new()), &config, temp.path())
        .unwrap();

    let outcome = pipeline.run().unwrap();
    assert!(matches!(
      outcome.hook_failures[0].error,
      PipelineError::EmptyManifest
    ));
    assert_eq!(outcome.exit_code(), exit_codes::REPORT_FAILURE);
    assert!(temp.path().join("dist/index.html").is_file());
  }

  #[test]
  fn copy_failures_outrank_report_failures() {
    let temp = tempdir().unwrap();
    let config = config_for(vec![AssetCopyTarget::new("missing.glb", "")]);
    let pipeline =
      BuildPipeline::from_config(FakeBundler::with_chunks(Vec::new()), &config, temp.path())
        .unwrap();

    let outcome = pipeline.run().unwrap();
    assert_eq!(outcome.failure_category(), Some(FailureCategory::AssetCopy));
    assert_eq!(outcome.exit_code(), exit_codes::ASSET_COPY_FAILURE);
  }

  #[test]
  fn hooks_see_the_manifest_of_their_phase() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorder = Recorder {
      events: Arc::clone(&events),
    };

    let temp = tempdir().unwrap();
    let pipeline = BuildPipeline::new(
      FakeBundler::with_chunks(sample_chunks()),
      temp.path(),
      BaseHref::default(),
    )
    .with_hook(recorder);

    pipeline.run().unwrap();
    assert_eq!(*events.lock().unwrap(), vec!["start:0", "generated:2"]);
  }

  #[test]
  fn disabled_report_registers_no_reporter() {
    let temp = tempdir().unwrap();
    let config = PipelineConfig {
      report_enabled: false,
      ..PipelineConfig::default()
    };
    let pipeline =
      BuildPipeline::from_config(FakeBundler::with_chunks(Vec::new()), &config, temp.path())
        .unwrap();
    assert!(pipeline.hook_names().is_empty());
    assert_eq!(pipeline.run().unwrap().exit_code(), exit_codes::SUCCESS);
  }

  #[test]
  fn report_options_follow_configuration() {
    let config = config_for(Vec::new());
    assert_eq!(config.report_options(), ReportOptions {
      title: crate::report::DEFAULT_REPORT_TITLE.into(),
      format: ReportFormat::Json,
    });
  }
}
