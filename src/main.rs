//! bundle-pipeline - stage static assets, relocate emitted references and report bundle composition.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relocatable_bundle_pipeline::error::exit_codes;
use relocatable_bundle_pipeline::{
  AssetStager, BuildManifest, BuildPipeline, Bundler, BundlerError, CompositionReporter,
  ConfigError, PipelineConfig, PipelineError, StatsFileBundler,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// bundle-pipeline - relocatable static bundle post-processing
#[derive(Parser, Debug)]
#[command(name = "bundle-pipeline")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Project root that relative paths are resolved against
  #[arg(long, default_value = ".")]
  project_root: PathBuf,

  /// Configuration file (defaults to bundle.config.{json,yaml,yml} in the project root)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log level (trace, debug, info, warn, error)
  #[arg(long, default_value = "info")]
  log_level: String,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Run the full pipeline over the bundler's output
  Build,

  /// Copy the configured static assets into the output root
  Stage,

  /// Render the composition report from a bundler stats file
  Report {
    /// Stats file to read instead of the configured one
    #[arg(long)]
    stats: Option<PathBuf>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::registry()
    .with(filter)
    .with(tracing_subscriber::fmt::layer().with_target(false))
    .init();

  match run(&cli) {
    Ok(code) => ExitCode::from(code),
    Err(err) => {
      tracing::error!("{err:#}");
      ExitCode::from(exit_code_for(&err))
    }
  }
}

fn run(cli: &Cli) -> Result<u8> {
  let project_root = cli.project_root.as_path();
  let config = load_config(project_root, cli.config.as_deref())?;

  match &cli.command {
    Commands::Build => build(project_root, &config),
    Commands::Stage => stage(project_root, &config),
    Commands::Report { stats } => report(project_root, &config, stats.as_deref()),
  }
}

fn load_config(project_root: &Path, explicit: Option<&Path>) -> Result<PipelineConfig> {
  match explicit {
    Some(path) => PipelineConfig::from_path(path)
      .with_context(|| format!("failed to load configuration from {}", path.display())),
    None => PipelineConfig::discover(project_root)
      .with_context(|| format!("failed to load configuration in {}", project_root.display())),
  }
}

fn build(project_root: &Path, config: &PipelineConfig) -> Result<u8> {
  let bundler = StatsFileBundler::new(
    config.bundle_stats_file(project_root),
    config.output_root_path(project_root),
  );
  let pipeline = BuildPipeline::from_config(bundler, config, project_root)
    .context("failed to configure build pipeline")?;
  let outcome = pipeline.run().context("build failed")?;

  for failure in &outcome.stage_failures {
    tracing::error!(
      source = %failure.target.source.display(),
      error = %failure.error,
      "asset was not staged"
    );
  }
  for artifact in &outcome.reports {
    tracing::info!(path = %artifact.path.display(), bytes = artifact.bytes, "report ready");
  }

  Ok(outcome.exit_code())
}

fn stage(project_root: &Path, config: &PipelineConfig) -> Result<u8> {
  let stager = AssetStager::new(project_root, config.output_root_path(project_root))
    .overwrite(config.overwrite_assets);
  let report = stager.stage(&config.asset_copy_targets);

  tracing::info!(
    staged = report.staged.len(),
    failed = report.failures.len(),
    "staging finished"
  );

  Ok(if report.is_success() {
    exit_codes::SUCCESS
  } else {
    exit_codes::ASSET_COPY_FAILURE
  })
}

fn report(project_root: &Path, config: &PipelineConfig, stats: Option<&Path>) -> Result<u8> {
  let stats_path = stats.map_or_else(|| config.bundle_stats_file(project_root), Path::to_path_buf);
  let output_root = config.output_root_path(project_root);
  let output = StatsFileBundler::new(&stats_path, &output_root)
    .bundle()
    .with_context(|| format!("failed to read bundle stats {}", stats_path.display()))?;

  let mut manifest = BuildManifest::new(&output_root, config.base()?.as_str());
  manifest.chunks = output.chunks;

  CompositionReporter::new(
    config.report_output_file(project_root),
    config.report_options(),
  )
  .compressed_sizes(config.compressed_sizes)
  .open_in_browser(config.open_report)
  .write_report(&manifest)
  .context("failed to write composition report")?;

  Ok(exit_codes::SUCCESS)
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
  if err.downcast_ref::<ConfigError>().is_some() {
    exit_codes::CONFIG_ERROR
  } else if let Some(pipeline) = err.downcast_ref::<PipelineError>() {
    pipeline.category().exit_code()
  } else if err.downcast_ref::<BundlerError>().is_some() {
    exit_codes::BUNDLER_FAILURE
  } else {
    exit_codes::REPORT_FAILURE
  }
}
