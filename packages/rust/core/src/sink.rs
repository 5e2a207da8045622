//! Destinations for exported datasets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::json;
use tracing::info;

use euclid_shared::{EuclidError, ExportFormat, Result};

/// Saves the binary payload of an export under a given file name.
pub trait ExportSink: Send + Sync {
    /// Persist `bytes` as `file_name` and return where it ended up.
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Writes exports into a directory on disk, overwriting earlier files.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for DirectorySink {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| EuclidError::io(&self.dir, e))?;

        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes).map_err(|e| EuclidError::io(&path, e))?;
        info!(?path, bytes = bytes.len(), "export saved");

        Ok(path)
    }
}

/// Keeps exports in memory, for headless/test usage.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents saved under `file_name`, if any.
    pub fn get(&self, file_name: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_name)
            .cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl ExportSink for MemorySink {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_name.to_string(), bytes.to_vec());
        Ok(PathBuf::from(file_name))
    }
}

/// A saved export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    /// Always `euclid_dataset.<format>`.
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: usize,
}

impl ExportArtifact {
    /// Summary recorded as the export stage's payload.
    pub fn to_payload(&self) -> serde_json::Value {
        json!({
            "format": self.format.as_str(),
            "file_name": self.file_name,
            "path": self.path.display().to_string(),
            "bytes": self.bytes,
        })
    }
}
