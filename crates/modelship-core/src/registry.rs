//! Durable model registry backed by a single JSON document
//!
//! The registry owns the `(name, version) -> ModelRecord` table. Every
//! mutating call re-reads the document, applies the change, and writes the
//! whole document back through a temp-file-plus-rename sequence, so an
//! interrupted write never leaves a truncated document behind. A missing
//! file reads as an empty registry.
//!
//! Concurrent processes racing on the same document are last-writer-wins;
//! each individual write is still atomic.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One registered model version.
///
/// The record stores a *reference* to the artifact path; the artifact bytes
/// are never copied into the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    /// Open set, validated by the loader at load time, not here
    pub framework: String,
    #[serde(default)]
    pub description: String,
    pub registered_at: DateTime<Utc>,
    /// Fields written by other tools; carried through rewrites untouched
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl ModelRecord {
    /// Composite key the persisted document is keyed by
    pub fn key(&self) -> String {
        registry_key(&self.name, &self.version)
    }
}

fn registry_key(name: &str, version: &str) -> String {
    format!("{name}::{version}")
}

type Document = BTreeMap<String, ModelRecord>;

/// Durable store of registered models, constructed with an explicit
/// document path (no process-wide singleton).
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    path: PathBuf,
}

impl ModelRegistry {
    /// Open-or-create: the document itself is only created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or overwrite the `(name, version)` entry and persist the
    /// whole document before returning. Re-registering an existing key
    /// replaces the record wholesale, including `registered_at`.
    pub fn register(
        &self,
        name: &str,
        version: &str,
        path: &Path,
        framework: &str,
        description: &str,
    ) -> Result<ModelRecord> {
        if name.trim().is_empty() {
            return Err(Error::InvalidRecord("model name must not be empty".into()));
        }
        if version.trim().is_empty() {
            return Err(Error::InvalidRecord(
                "model version must not be empty".into(),
            ));
        }

        let mut doc = self.read_document()?;
        let record = ModelRecord {
            name: name.to_string(),
            version: version.to_string(),
            path: path.to_path_buf(),
            framework: framework.to_string(),
            description: description.to_string(),
            registered_at: Utc::now(),
            extra: Map::new(),
        };
        doc.insert(record.key(), record.clone());
        self.write_document(&doc)?;
        Ok(record)
    }

    /// Look up one record
    pub fn get(&self, name: &str, version: &str) -> Result<ModelRecord> {
        let mut doc = self.read_document()?;
        doc.remove(&registry_key(name, version))
            .ok_or_else(|| Error::RecordNotFound {
                name: name.to_string(),
                version: version.to_string(),
            })
    }

    /// All records, in key order (deterministic across repeated calls)
    pub fn list(&self) -> Result<Vec<ModelRecord>> {
        Ok(self.read_document()?.into_values().collect())
    }

    /// Remove one record. Returns whether anything was removed; an absent
    /// key is not an error and leaves the document untouched.
    pub fn delete(&self, name: &str, version: &str) -> Result<bool> {
        let mut doc = self.read_document()?;
        let removed = doc.remove(&registry_key(name, version)).is_some();
        if removed {
            self.write_document(&doc)?;
        }
        Ok(removed)
    }

    fn read_document(&self) -> Result<Document> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(Error::persistence(&self.path, format!("read failed: {e}"))),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::persistence(&self.path, format!("parse failed: {e}")))
    }

    fn write_document(&self, doc: &Document) -> Result<()> {
        let json = serde_json::to_vec_pretty(doc)
            .map_err(|e| Error::persistence(&self.path, format!("serialize failed: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::persistence(&self.path, format!("create parent directory failed: {e}"))
                })?;
            }
        }

        // Write a sibling temp file, then rename over the document so a
        // crash mid-write cannot leave a half-written registry.
        let tmp = temp_path(&self.path);
        fs::write(&tmp, &json)
            .map_err(|e| Error::persistence(&self.path, format!("write failed: {e}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::persistence(&self.path, format!("rename failed: {e}")))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
