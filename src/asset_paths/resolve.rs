use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use crate::error::PipelineError;

/// Resolve the absolute destination of `source` when copied into `destination_dir`.
///
/// `destination_dir` is interpreted relative to `output_root`; an empty value selects the
/// output root itself. The result always sits below the (absolutised) output root.
pub fn resolve(
    source: &Path,
    destination_dir: &str,
    output_root: &Path,
) -> Result<PathBuf, PipelineError> {
    resolve_named(source, destination_dir, None, output_root)
}

/// Like [`resolve`], optionally replacing the file name of `source` with `rename`.
pub fn resolve_named(
    source: &Path,
    destination_dir: &str,
    rename: Option<&str>,
    output_root: &Path,
) -> Result<PathBuf, PipelineError> {
    if source.as_os_str().is_empty() {
        return Err(PipelineError::invalid_path(source, "source path is empty"));
    }

    ensure_readable(source)?;

    let file_name = match rename {
        Some(name) => validate_file_name(name)?.to_string(),
        None => source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| PipelineError::invalid_path(source, "source path has no file name"))?,
    };

    let root = absolute_root(output_root)?;
    let relative = normalise_relative(destination_dir)?;
    Ok(root.join(relative).join(file_name))
}

/// Lexically normalise a path that must stay inside the directory it is joined onto.
///
/// Backslashes are treated as separators, `.` segments are dropped and `..` removes the
/// preceding segment. Absolute paths and `..` segments that would climb above the starting
/// directory are rejected.
pub fn normalise_relative(value: &str) -> Result<PathBuf, PipelineError> {
    let slashed = value.replace('\\', "/");
    let as_path = Path::new(&slashed);
    if slashed.starts_with('/')
        || as_path.is_absolute()
        || as_path
            .components()
            .any(|component| matches!(component, Component::Prefix(_) | Component::RootDir))
    {
        return Err(PipelineError::invalid_path(
            value,
            "must be relative to the output root",
        ));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in slashed.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PipelineError::invalid_path(value, "escapes the output root"));
                }
            }
            other => segments.push(other),
        }
    }

    Ok(segments.iter().collect())
}

/// Render a relative path with forward slashes regardless of the host separator.
pub fn to_url_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn ensure_readable(source: &Path) -> Result<(), PipelineError> {
    let not_found = |err| PipelineError::SourceNotFound {
        path: source.to_path_buf(),
        source: err,
    };

    let metadata = fs::metadata(source).map_err(not_found)?;
    if metadata.is_dir() {
        fs::read_dir(source).map_err(not_found)?;
    } else {
        File::open(source).map_err(not_found)?;
    }
    Ok(())
}

/// Check that `name` is a single path segment usable as a file name.
pub(crate) fn validate_file_name(name: &str) -> Result<&str, PipelineError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(PipelineError::invalid_path(
            name,
            "rename must be a plain file name",
        ));
    }
    Ok(name)
}

fn absolute_root(output_root: &Path) -> Result<PathBuf, PipelineError> {
    if output_root.as_os_str().is_empty() {
        return Err(PipelineError::invalid_path(output_root, "output root is empty"));
    }

    let absolute = std::path::absolute(output_root).map_err(|err| {
        PipelineError::invalid_path(output_root, format!("cannot be made absolute: {err}"))
    })?;

    let mut normalised = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalised.pop();
            }
            other => normalised.push(other.as_os_str()),
        }
    }
    Ok(normalised)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn source_in(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"glTF").unwrap();
        path
    }

    #[test]
    fn resolves_into_destination_directory() {
        let temp = tempdir().unwrap();
        let source = source_in(temp.path(), "assets/test-scene.glb");
        let root = temp.path().join("dist");

        let resolved = resolve(&source, "assets/", &root).unwrap();
        assert_eq!(resolved, root.join("assets").join("test-scene.glb"));
    }

    #[test]
    fn empty_destination_selects_output_root() {
        let temp = tempdir().unwrap();
        let source = source_in(temp.path(), "favicon.ico");
        let root = temp.path().join("dist");

        let resolved = resolve(&source, "", &root).unwrap();
        assert_eq!(resolved, root.join("favicon.ico"));
    }

    #[test]
    fn rename_replaces_the_file_name() {
        let temp = tempdir().unwrap();
        let source = source_in(temp.path(), "scene-v2.glb");
        let root = temp.path().join("dist");

        let resolved = resolve_named(&source, "models", Some("scene.glb"), &root).unwrap();
        assert_eq!(resolved, root.join("models").join("scene.glb"));

        let err = resolve_named(&source, "models", Some("../scene.glb"), &root).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPath { .. }));
    }

    #[test]
    fn rejects_destinations_that_escape_the_root() {
        let temp = tempdir().unwrap();
        let source = source_in(temp.path(), "scene.glb");
        let root = temp.path().join("dist");

        for destination in ["..", "../assets", "assets/../../x", "/etc", "\\abs", "a\\..\\.."] {
            let err = resolve(&source, destination, &root).unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidPath { .. }),
                "{destination} should be rejected"
            );
        }
    }

    #[test]
    fn accepted_destinations_are_descendants_of_the_root() {
        let temp = tempdir().unwrap();
        let source = source_in(temp.path(), "scene.glb");
        let root = temp.path().join("out/../dist");
        let absolute = temp.path().join("dist");

        let destinations = [
            "", ".", "./", "assets", "assets/", "a/b/../c", "a/./b", "a\\b", "a/..", "x/y/z/../..",
        ];
        for destination in destinations {
            let resolved = resolve(&source, destination, &root).unwrap();
            assert!(
                resolved.starts_with(&absolute),
                "{} escaped {}",
                resolved.display(),
                absolute.display()
            );
        }
    }

    #[test]
    fn missing_sources_are_reported_by_path() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("assets/missing.glb");

        let err = resolve(&missing, "assets", &temp.path().join("dist")).unwrap_err();
        match err {
            PipelineError::SourceNotFound { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_source_is_invalid() {
        let err = resolve(Path::new(""), "assets", Path::new("dist")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPath { .. }));
    }

    #[test]
    fn url_paths_use_forward_slashes() {
        assert_eq!(to_url_path(Path::new("assets\\scene.glb")), "assets/scene.glb");
    }
}
