//! Per-project governance configuration.
//!
//! The config file lives at `<project>/.governor/config.json`. Loading is
//! strict: unknown keys, wrong types, and malformed custom rules are all load
//! errors rather than silent fallbacks, so a typo never weakens the gate.
//!
//! A process-wide cache keyed by resolved project directory avoids re-reading
//! the file on every invocation; callers that change the file invalidate the
//! entry explicitly.

use crate::rules::{Severity, ValidationRule};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Directory under the project root holding gate state (config, tokens, audit).
pub const STATE_DIR: &str = ".governor";
/// Recognized config file name.
pub const CONFIG_FILE: &str = "config.json";

/// Project-level configuration for the gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct GovernanceConfig {
    /// Master switch; `false` allows everything without evaluation.
    pub enabled: bool,
    /// Raises medium-severity findings from warn to block.
    pub strict_mode: bool,
    /// Rule ids removed from the effective set.
    pub disabled_rules: Vec<String>,
    /// Per-rule severity replacements.
    pub severity_overrides: HashMap<String, Severity>,
    /// Globs for paths where file operations bypass content rules.
    pub allowed_paths: Vec<String>,
    /// Project-specific rules merged into the effective set.
    pub custom_rules: Vec<ValidationRule>,
    /// Log plain-allow decisions too (blocked/warned always log).
    pub log_all_validations: bool,
    /// Config schema version.
    pub version: String,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict_mode: false,
            disabled_rules: Vec::new(),
            severity_overrides: HashMap::new(),
            allowed_paths: Vec::new(),
            custom_rules: Vec::new(),
            log_all_validations: false,
            version: "1.0".to_string(),
        }
    }
}

impl GovernanceConfig {
    #[must_use]
    pub fn is_rule_disabled(&self, rule_id: &str) -> bool {
        self.disabled_rules.iter().any(|id| id == rule_id)
    }

    #[must_use]
    pub fn severity_override(&self, rule_id: &str) -> Option<Severity> {
        self.severity_overrides.get(rule_id).copied()
    }
}

/// Error loading or parsing a project config file.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "invalid config {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Path of the config file for a project.
#[must_use]
pub fn config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(STATE_DIR).join(CONFIG_FILE)
}

/// Load the config for a project directly from disk.
///
/// A missing file yields defaults; a present but invalid file is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be read, or
/// [`ConfigError::Parse`] on unknown keys, wrong types, or malformed custom
/// rules.
pub fn load_config(project_dir: &Path) -> Result<GovernanceConfig, ConfigError> {
    let path = config_path(project_dir);
    if !path.exists() {
        return Ok(GovernanceConfig::default());
    }

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;

    serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
        path,
        message: e.to_string(),
    })
}

fn cache() -> &'static Mutex<HashMap<PathBuf, GovernanceConfig>> {
    static CACHE: OnceLock<Mutex<HashMap<PathBuf, GovernanceConfig>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn cache_key(project_dir: &Path) -> PathBuf {
    project_dir
        .canonicalize()
        .unwrap_or_else(|_| project_dir.to_path_buf())
}

/// Load the config for a project, consulting the process-wide cache.
///
/// # Errors
///
/// Same as [`load_config`]. Errors are never cached.
pub fn load_config_cached(project_dir: &Path) -> Result<GovernanceConfig, ConfigError> {
    let key = cache_key(project_dir);

    if let Ok(entries) = cache().lock() {
        if let Some(config) = entries.get(&key) {
            return Ok(config.clone());
        }
    }

    let config = load_config(project_dir)?;
    if let Ok(mut entries) = cache().lock() {
        entries.insert(key, config.clone());
    }
    Ok(config)
}

/// Drop the cached entry for one project.
pub fn invalidate_config_cache(project_dir: &Path) {
    if let Ok(mut entries) = cache().lock() {
        entries.remove(&cache_key(project_dir));
    }
}

/// Drop every cached entry.
pub fn clear_config_cache() {
    if let Ok(mut entries) = cache().lock() {
        entries.clear();
    }
}

/// A starter config, written by `governor config init`.
#[must_use]
pub fn generate_sample_config() -> String {
    let sample = GovernanceConfig {
        allowed_paths: vec!["tests/**".to_string(), "docs/**".to_string()],
        ..GovernanceConfig::default()
    };
    // Defaults always serialize.
    serde_json::to_string_pretty(&sample).unwrap_or_else(|_| "{}".to_string())
}
