use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::project::{read_json, write_json, ProjectError};

// ── Sandbox limits ───────────────────────────────────────────────

/// Limits applied to every script run. Each field has a serde default so a
/// partial settings file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct SandboxConfig {
    /// Wall-clock budget for one run, in seconds.
    pub max_execution_seconds: f64,
    /// Interpreter step budget. `None` leaves only the wall-clock deadline.
    pub max_operations: Option<u64>,
    /// Maximum nesting of user function calls.
    pub max_call_depth: usize,
    /// Largest list, map or range a script may build.
    pub max_collection_len: usize,
    /// Longest string a script may build.
    pub max_string_len: usize,
    /// Script `log(...)` lines kept in the result; later lines are dropped.
    pub max_log_lines: usize,
    /// Fixed seed for `random_*` helpers. `None` seeds from the clock.
    pub random_seed: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_execution_seconds: 5.0,
            max_operations: Some(10_000_000),
            max_call_depth: 64,
            max_collection_len: 100_000,
            max_string_len: 100_000,
            max_log_lines: 100,
            random_seed: None,
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.max_execution_seconds.is_finite() || self.max_execution_seconds <= 0.0 {
            return Err(SettingsError::Invalid(format!(
                "maxExecutionSeconds must be positive and finite, got {}",
                self.max_execution_seconds
            )));
        }
        if self.max_operations == Some(0) {
            return Err(SettingsError::Invalid("maxOperations must be at least 1".into()));
        }
        for (name, value) in [
            ("maxCallDepth", self.max_call_depth),
            ("maxCollectionLen", self.max_collection_len),
            ("maxStringLen", self.max_string_len),
        ] {
            if value == 0 {
                return Err(SettingsError::Invalid(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}

// ── App settings ─────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Io(#[from] ProjectError),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Application-level settings stored in the OS config directory.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AppSettings {
    pub version: u32,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Ball count for a blank show when no project file is given.
    #[serde(default = "default_ball_count")]
    pub default_ball_count: usize,
}

const SETTINGS_VERSION: u32 = 1;

fn default_ball_count() -> usize {
    4
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            sandbox: SandboxConfig::default(),
            default_ball_count: default_ball_count(),
        }
    }
}

/// Load settings from a file. A missing file yields the defaults; a present
/// but invalid one is an error.
pub fn load_settings(path: &Path) -> Result<AppSettings, SettingsError> {
    if !path.exists() {
        log::debug!("no settings at {}, using defaults", path.display());
        return Ok(AppSettings::default());
    }
    let settings: AppSettings = read_json(path)?;
    settings.sandbox.validate()?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(ProjectError::from)?;
    }
    write_json(path, settings)?;
    Ok(())
}
