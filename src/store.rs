//! Key/value store persisted as one JSON object on disk.
//!
//! Stands in for the browser's `localStorage`: string keys, JSON values,
//! whole-object rewrite on every change, last write wins.

use crate::constants::STORE_FILE_NAME;
use crate::error::{EvidenceError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(STORE_FILE_NAME),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let map = self.load()?;
        match map.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| EvidenceError::Store(format!("value under '{}' is invalid: {}", key, e))),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut map = self.load()?;
        map.insert(key.to_string(), serde_json::to_value(value)?);
        self.write(&map)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.load()?;
        if map.remove(key).is_some() {
            self.write(&map)?;
        }
        Ok(())
    }

    fn load(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| EvidenceError::Store(format!("{}: {}", self.path.display(), e)))
    }

    // temp file + rename so a crash never leaves a half-written store
    fn write(&self, map: &Map<String, Value>) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, map)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
