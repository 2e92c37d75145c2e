//! Section export sources backed by JSON files on disk.

use std::{
  fs,
  path::{Path, PathBuf},
};

use tally_core::export::{SectionExport, SectionSource};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
  #[error("cannot read {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("cannot parse {path}: {source}")]
  Parse {
    path:   PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("{path} holds section {found}, expected {expected}")]
  UnitMismatch {
    path:     PathBuf,
    expected: String,
    found:    String,
  },
}

pub fn load_export(path: &Path) -> Result<SectionExport, SourceError> {
  let raw = fs::read_to_string(path).map_err(|source| SourceError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  serde_json::from_str(&raw).map_err(|source| SourceError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

/// Treats each requested unit as a path to an export file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportFiles;

impl SectionSource for ExportFiles {
  type Error = SourceError;

  fn export(&self, path: &str) -> Result<SectionExport, SourceError> {
    load_export(Path::new(path))
  }
}

/// A directory of saved exports named `<unit_id>.json`.
#[derive(Debug, Clone)]
pub struct ExportDir {
  root: PathBuf,
}

impl ExportDir {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }
}

impl SectionSource for ExportDir {
  type Error = SourceError;

  fn export(&self, unit_id: &str) -> Result<SectionExport, SourceError> {
    let path = self.root.join(format!("{unit_id}.json"));
    let export = load_export(&path)?;
    if export.section.unit_id != unit_id {
      return Err(SourceError::UnitMismatch {
        path,
        expected: unit_id.to_owned(),
        found: export.section.unit_id,
      });
    }
    Ok(export)
  }
}
