//! Settings Adapters
//!
//! Implements the `Settings` port. Records are small and few (one expiration
//! and one limiter record per cache), so both adapters keep the whole map in
//! memory and the file-backed one rewrites its document on every change.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::ports::Settings;
use crate::error::{Error, Result};

/// A stored settings value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Long(i64),
    Text(String),
}

fn expect_long(key: &str, value: Option<&SettingValue>) -> Result<Option<i64>> {
    match value {
        None => Ok(None),
        Some(SettingValue::Long(v)) => Ok(Some(*v)),
        Some(SettingValue::Text(_)) => Err(Error::Settings(format!(
            "value for '{}' is a string, expected an integer",
            key
        ))),
    }
}

fn expect_string(key: &str, value: Option<&SettingValue>) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(SettingValue::Text(v)) => Ok(Some(v.clone())),
        Some(SettingValue::Long(_)) => Err(Error::Settings(format!(
            "value for '{}' is an integer, expected a string",
            key
        ))),
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Settings held only in memory (tests, ephemeral hosts)
#[derive(Debug, Default)]
pub struct InMemorySettings {
    values: RwLock<BTreeMap<String, SettingValue>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl Settings for InMemorySettings {
    fn get_long(&self, key: &str) -> Result<Option<i64>> {
        expect_long(key, self.values.read().get(key))
    }

    fn put_long(&self, key: &str, value: i64) -> Result<()> {
        self.values
            .write()
            .insert(key.to_string(), SettingValue::Long(value));
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        expect_string(key, self.values.read().get(key))
    }

    fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .insert(key.to_string(), SettingValue::Text(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

// =============================================================================
// File-backed
// =============================================================================

/// Settings persisted as a JSON document.
///
/// Every write replaces the document through a synced temp file and a rename,
/// so the change is durable when the call returns.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    values: Mutex<BTreeMap<String, SettingValue>>,
}

impl FileSettings {
    /// Open (or start) the settings document at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Settings(format!("failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::io(format!("reading {}", path.display()), e)),
        };

        debug!("Opened settings {} with {} records", path.display(), values.len());

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, SettingValue>),
    {
        let mut values = self.values.lock();
        let mut next = values.clone();
        f(&mut next);
        if next == *values {
            return Ok(());
        }
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn persist(&self, values: &BTreeMap<String, SettingValue>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("creating directory {}", parent.display()), e))?;
        }

        let bytes = serde_json::to_vec_pretty(values)
            .map_err(|e| Error::Settings(format!("failed to encode settings: {}", e)))?;

        let temp = self.path.with_extension("tmp");
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&temp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&temp, &self.path)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&temp);
            Error::io(format!("writing {}", self.path.display()), e)
        })
    }
}

impl Settings for FileSettings {
    fn get_long(&self, key: &str) -> Result<Option<i64>> {
        expect_long(key, self.values.lock().get(key))
    }

    fn put_long(&self, key: &str, value: i64) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), SettingValue::Long(value));
        })
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        expect_string(key, self.values.lock().get(key))
    }

    fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), SettingValue::Text(value.to_string()));
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|values| {
            values.remove(key);
        })
    }
}
