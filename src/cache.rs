//! Persisted statistics cache.
//!
//! A [`CacheDocument`] is an ordered `name -> value` mapping stored as one
//! pretty-printed JSON object per analysis target. Loading is forgiving (a
//! missing or malformed artifact reads as an empty document, which forces
//! recomputation) while saving is strict and atomic: the document is written
//! to a sibling temp file and renamed over the target.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::constants::cache::TEMP_EXTENSION;
use crate::errors::StatsError;
use crate::types::StatKey;

/// Ordered mapping of statistic name to its serialized value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheDocument {
    entries: IndexMap<StatKey, Value>,
}

impl CacheDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `key` has been computed and persisted before.
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// True when every key in `keys` is present.
    pub fn has_all<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        keys.iter().all(|key| self.has(key.as_ref()))
    }

    /// Stored value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Insert or overwrite `key`. Overwrites keep the key's original position.
    pub fn insert(&mut self, key: impl Into<StatKey>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Merge a batch of statistics, preserving existing key positions.
    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (StatKey, Value)>,
    {
        for (key, value) in entries {
            self.entries.insert(key, value);
        }
    }

    /// Keys in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of statistics stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the document exactly as it is persisted.
    pub fn to_pretty_string(&self) -> Result<String, StatsError> {
        let mut rendered =
            serde_json::to_string_pretty(&self.entries).map_err(|err| StatsError::Cache {
                path: "<memory>".to_string(),
                reason: format!("failed encoding document: {err}"),
            })?;
        rendered.push('\n');
        Ok(rendered)
    }
}

/// File-backed store for one [`CacheDocument`].
#[derive(Clone, Debug)]
pub struct StatisticsCache {
    path: PathBuf,
}

impl StatisticsCache {
    /// Cache stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the persisted document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or an empty one when missing, unreadable, or malformed.
    pub fn load(&self) -> CacheDocument {
        load(&self.path)
    }

    /// Atomically replace the persisted document.
    pub fn save(&self, document: &CacheDocument) -> Result<(), StatsError> {
        save(document, &self.path)
    }
}

/// Load a document from `path`; any failure yields an empty document.
pub fn load(path: &Path) -> CacheDocument {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("[appstats:cache] no cache at {}; starting empty", path.display());
            return CacheDocument::new();
        }
        Err(err) => {
            warn!(
                "[appstats:cache] unreadable cache {}; recomputing: {}",
                path.display(),
                err
            );
            return CacheDocument::new();
        }
    };
    match serde_json::from_str::<IndexMap<StatKey, Value>>(&raw) {
        Ok(entries) => CacheDocument { entries },
        Err(err) => {
            warn!(
                "[appstats:cache] malformed cache {}; recomputing: {}",
                path.display(),
                err
            );
            CacheDocument::new()
        }
    }
}

/// Persist `document` at `path` with a write-to-temp-then-rename replace.
pub fn save(document: &CacheDocument, path: &Path) -> Result<(), StatsError> {
    let rendered = document.to_pretty_string()?;
    write_atomic(path, rendered.as_bytes())
}

/// Write `bytes` to `path` atomically, creating the parent directory if needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StatsError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| StatsError::Cache {
            path: path.display().to_string(),
            reason: format!("failed creating directory {}: {err}", parent.display()),
        })?;
    }
    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, bytes).map_err(|err| StatsError::Cache {
        path: path.display().to_string(),
        reason: format!("failed writing temp {}: {err}", tmp_path.display()),
    })?;
    fs::rename(&tmp_path, path).map_err(|err| StatsError::Cache {
        path: path.display().to_string(),
        reason: format!("failed replacing artifact: {err}"),
    })?;
    Ok(())
}

/// `prefix` with `suffix` appended verbatim (`out/stats` + `.db_statistics.json`).
pub fn suffixed(prefix: &Path, suffix: &str) -> PathBuf {
    let mut raw = prefix.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Write `value` as two-space pretty JSON with a trailing newline.
pub fn write_json_atomic(path: &Path, value: &Value) -> Result<(), StatsError> {
    let mut rendered = serde_json::to_string_pretty(value).map_err(|err| StatsError::Cache {
        path: path.display().to_string(),
        reason: format!("failed encoding document: {err}"),
    })?;
    rendered.push('\n');
    write_atomic(path, rendered.as_bytes())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(TEMP_EXTENSION);
    path.with_file_name(name)
}
