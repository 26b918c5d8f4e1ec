use std::fs;
use std::path::Path;

use relocatable_bundle_pipeline::error::exit_codes;
use relocatable_bundle_pipeline::{
  AssetCopyTarget, BuildPipeline, PipelineConfig, ReportFormat, StatsFileBundler,
};
use tempfile::tempdir;

fn write_file(path: &Path, contents: &[u8]) {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, contents).unwrap();
}

fn scaffold(project: &Path) -> Vec<u8> {
  let scene: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
  write_file(&project.join("assets/test-scene.glb"), &scene);

  write_file(&project.join("dist/assets/index.js"), &[b'a'; 1000]);
  write_file(&project.join("dist/assets/vendor.js"), &[b'v'; 500]);
  write_file(
    &project.join("dist/index.html"),
    br#"<!DOCTYPE html>
<html>
  <head>
    <link rel="stylesheet" href="/assets/index.css">
    <script type="module" src="/assets/index.js"></script>
  </head>
  <body><model-viewer src="/assets/test-scene.glb"></model-viewer></body>
</html>
"#,
  );
  write_file(
    &project.join("dist/assets/index.css"),
    b"body { background: url(/assets/bg.png); }",
  );
  write_file(
    &project.join("dist/bundle-stats.json"),
    br#"{
      "chunks": [
        { "id": "vendor", "fileName": "assets/vendor.js",
          "modules": [{ "id": "node_modules/three/build/three.module.js", "size": 480 }] },
        { "id": "index", "fileName": "assets/index.js",
          "modules": [
            { "id": "src/main.js", "size": 700 },
            { "id": "src/scene.js", "size": 250 },
            { "id": "src/virtual:env" }
          ] }
      ],
      "documents": ["index.html", "assets/index.css"]
    }"#,
  );
  scene
}

fn config() -> PipelineConfig {
  PipelineConfig {
    asset_copy_targets: vec![AssetCopyTarget::new("assets/test-scene.glb", "assets/")],
    report_format: ReportFormat::Json,
    report_output_path: "bundle-visualization.json".into(),
    ..PipelineConfig::default()
  }
}

#[test]
fn end_to_end_build_is_relocatable_and_fully_attributed() {
  let temp = tempdir().unwrap();
  let project = temp.path();
  let scene = scaffold(project);
  let config = config();

  let bundler = StatsFileBundler::new(
    config.bundle_stats_file(project),
    config.output_root_path(project),
  );
  let outcome = BuildPipeline::from_config(bundler, &config, project)
    .unwrap()
    .run()
    .unwrap();

  assert_eq!(outcome.exit_code(), exit_codes::SUCCESS);
  assert_eq!(fs::read(project.join("dist/assets/test-scene.glb")).unwrap(), scene);

  let html = fs::read_to_string(project.join("dist/index.html")).unwrap();
  assert!(html.contains(r#"href="./assets/index.css""#));
  assert!(html.contains(r#"src="./assets/index.js""#));
  assert!(html.contains(r#"src="./assets/test-scene.glb""#));
  assert!(!html.contains(r#""/assets/"#));

  let css = fs::read_to_string(project.join("dist/assets/index.css")).unwrap();
  assert_eq!(css, "body { background: url(../assets/bg.png); }");

  let report: serde_json::Value =
    serde_json::from_slice(&fs::read(project.join("bundle-visualization.json")).unwrap())
      .unwrap();
  let chunks = report["chunks"].as_array().unwrap();
  let totals: Vec<(&str, u64)> = chunks
    .iter()
    .map(|chunk| {
      let sum: u64 = chunk["modules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|module| module["byteSize"].as_u64().unwrap())
        .sum();
      (chunk["id"].as_str().unwrap(), sum)
    })
    .collect();
  assert_eq!(totals, vec![("index", 1000), ("vendor", 500)]);
  assert_eq!(report["totalBytes"].as_u64(), Some(1500));
}

#[test]
fn rebuilding_is_idempotent() {
  let temp = tempdir().unwrap();
  let project = temp.path();
  scaffold(project);
  let config = config();

  let run = || {
    let bundler = StatsFileBundler::new(
      config.bundle_stats_file(project),
      config.output_root_path(project),
    );
    BuildPipeline::from_config(bundler, &config, project)
      .unwrap()
      .run()
      .unwrap()
  };

  run();
  let html = fs::read(project.join("dist/index.html")).unwrap();
  let report = fs::read(project.join("bundle-visualization.json")).unwrap();

  assert_eq!(run().exit_code(), exit_codes::SUCCESS);
  assert_eq!(fs::read(project.join("dist/index.html")).unwrap(), html);
  assert_eq!(fs::read(project.join("bundle-visualization.json")).unwrap(), report);
}

#[test]
fn missing_copy_source_yields_asset_copy_exit_code() {
  let temp = tempdir().unwrap();
  let project = temp.path();
  scaffold(project);
  let mut config = config();
  config.asset_copy_targets = vec![
    AssetCopyTarget::new("assets/test-scene.glb", "assets/"),
    AssetCopyTarget::new("assets/missing.glb", "assets/"),
  ];

  let bundler = StatsFileBundler::new(
    config.bundle_stats_file(project),
    config.output_root_path(project),
  );
  let outcome = BuildPipeline::from_config(bundler, &config, project)
    .unwrap()
    .run()
    .unwrap();

  assert_eq!(outcome.exit_code(), exit_codes::ASSET_COPY_FAILURE);
  assert_eq!(outcome.stage_failures.len(), 1);
  assert!(project.join("dist/assets/test-scene.glb").is_file());
  assert!(project.join("bundle-visualization.json").is_file());
}

#[test]
fn missing_stats_file_is_a_bundler_failure() {
  let temp = tempdir().unwrap();
  let project = temp.path();
  let config = config();

  let bundler = StatsFileBundler::new(
    config.bundle_stats_file(project),
    config.output_root_path(project),
  );
  let err = BuildPipeline::from_config(bundler, &config, project)
    .unwrap()
    .run()
    .unwrap_err();

  assert_eq!(err.category().exit_code(), exit_codes::BUNDLER_FAILURE);
  assert!(!project.join("bundle-visualization.json").exists());
}
