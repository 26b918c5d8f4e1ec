//! Atomic file writes: content lands in a temporary file beside the destination and is
//! renamed into place, so readers never observe a partially written file.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

const TEMP_PREFIX: &str = ".staging-";
const TEMP_SUFFIX: &str = ".tmp";

/// Write `contents` to `path`, creating parent directories as needed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
  let mut temp_file = temp_file_beside(path)?;
  temp_file.write_all(contents)?;
  temp_file.as_file().sync_all()?;
  temp_file.persist(path).map_err(|err| err.error)?;
  Ok(())
}

/// Copy `source` to `destination` byte for byte, returning the number of bytes copied.
pub fn copy_atomic(source: &Path, destination: &Path) -> Result<u64, CopyError> {
  let mut reader = File::open(source).map_err(CopyError::Read)?;
  let mut temp_file = temp_file_beside(destination).map_err(CopyError::Write)?;
  let bytes = io::copy(&mut reader, temp_file.as_file_mut()).map_err(CopyError::Write)?;
  temp_file.as_file().sync_all().map_err(CopyError::Write)?;
  temp_file
    .persist(destination)
    .map_err(|err| CopyError::Write(err.error))?;
  Ok(bytes)
}

/// Which side of a copy failed.
#[derive(Debug)]
pub enum CopyError {
  /// The source could not be opened or read.
  Read(io::Error),
  /// The destination could not be created, written or renamed into place.
  Write(io::Error),
}

fn temp_file_beside(path: &Path) -> io::Result<NamedTempFile> {
  let parent = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  fs::create_dir_all(parent)?;
  tempfile::Builder::new()
    .prefix(TEMP_PREFIX)
    .suffix(TEMP_SUFFIX)
    .tempfile_in(parent)
}

/// Remove temporary files that interrupted atomic writes left anywhere below `dir`.
///
/// Returns the number of files removed. A missing `dir` removes nothing. Symlinked directories
/// are not followed.
pub fn remove_stale_temp_files(dir: &Path) -> io::Result<usize> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
    Err(err) => return Err(err),
  };

  let mut removed = 0;
  for entry in entries {
    let entry = entry?;
    let file_type = entry.file_type()?;
    if file_type.is_dir() {
      removed += remove_stale_temp_files(&entry.path())?;
    } else if file_type.is_file() && is_temp_file_name(&entry.file_name()) {
      fs::remove_file(entry.path())?;
      removed += 1;
    }
  }
  Ok(removed)
}

fn is_temp_file_name(name: &OsStr) -> bool {
  name
    .to_str()
    .is_some_and(|name| name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX))
}
