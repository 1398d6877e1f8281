//! Path definitions for the files the CLI and HTTP server read by default.

use std::path::{Path, PathBuf};

pub const APP_ID: &str = "com.ballseq.tools";

pub const SETTINGS_FILE: &str = "settings.json";

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

/// Platform config directory for the app: `$XDG_CONFIG_HOME` or `~/.config`
/// on Unix, `%APPDATA%` on Windows. Falls back to the working directory.
pub fn default_config_dir() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("APPDATA").map(PathBuf::from))
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(APP_ID)
}
