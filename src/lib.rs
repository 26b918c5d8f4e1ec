#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod asset_paths;
pub mod builder;
pub mod bundle;
pub mod config;
pub mod error;
pub mod fs;
pub mod hooks;
pub mod models;
pub mod report;
pub mod stager;

pub use builder::{BuildOutcome, BuildPipeline, HookFailure};
pub use bundle::{BaseHref, StatsFileBundler, apply_base};
pub use config::PipelineConfig;
pub use error::{BundlerError, ConfigError, FailureCategory, PipelineError};
pub use hooks::{BuildHook, BundleOutput, Bundler, HookEffect};
pub use models::{
  AssetCopyTarget, BuildManifest, CopyStatus, DocumentKind, EmittedDocument, OutputChunk,
  StageFailure, StageReport, StagedAsset,
};
pub use report::{CompositionReport, CompositionReporter, ReportFormat, render};
pub use stager::{AssetStager, StaticCopy};
