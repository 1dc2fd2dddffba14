//! Runtime configuration stored as TOML (`quad-runtime.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::cache::{ConflictPolicy, InMemorySessionCache};

/// Runtime configuration (TOML).
///
/// Missing fields default to the values used by the in-process runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Session id used when a caller does not supply one.
    pub default_session_id: String,

    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Pre-allocated entry capacity of the session cache.
    pub initial_capacity: usize,

    /// Behavior of `put` on a key that already holds a different live context.
    pub conflict: ConflictPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 100,
            conflict: ConflictPolicy::Replace,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_session_id: "local".to_string(),
            cache: CacheConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_session_id.trim().is_empty() {
            return Err(anyhow!("default_session_id must be non-empty"));
        }
        if self.cache.initial_capacity == 0 {
            return Err(anyhow!("cache.initial_capacity must be > 0"));
        }
        Ok(())
    }

    pub fn session_cache(&self) -> InMemorySessionCache {
        InMemorySessionCache::new(self.cache.initial_capacity, self.cache.conflict)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RuntimeConfig::default()`.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    if !path.exists() {
        let cfg = RuntimeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RuntimeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RuntimeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
