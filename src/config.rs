//! Daemon settings: combos, unload policy and race-guard timing.
//!
//! Read from a TOML file at startup; the extension may replace them at
//! runtime with a `settings` message carrying the same structure as JSON.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::gesture::ComboConfig;
use crate::unload::{UnloadOptions, UnloadTiming};

/// Highest mouse button index the browser reports.
pub const MAX_BUTTON: u8 = 4;

/// Failure to load or accept a settings file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {}", join(.0))]
    Invalid(Vec<ValidationIssue>),
}

fn join(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One problem found by [`Settings::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Everything the host can be configured with, from a file or the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "combo", alias = "combos")]
    pub combos: Vec<ComboConfig>,
    pub unload: UnloadOptions,
    pub timing: UnloadTiming,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            combos: vec![ComboConfig::default()],
            unload: UnloadOptions::default(),
            timing: UnloadTiming::default(),
        }
    }
}

impl Settings {
    /// Collect every problem with these settings; empty when usable.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (i, combo) in self.combos.iter().enumerate() {
            if combo.button > MAX_BUTTON {
                issues.push(ValidationIssue {
                    path: format!("combo[{i}].button"),
                    message: format!("button index must be at most {MAX_BUTTON}"),
                });
            }
            if combo.min_timeout_ms > 0
                && combo.max_timeout_ms > 0
                && combo.min_timeout_ms > combo.max_timeout_ms
            {
                issues.push(ValidationIssue {
                    path: format!("combo[{i}].min_timeout_ms"),
                    message: "minimum press duration exceeds the maximum".into(),
                });
            }
        }
        issues
    }

    /// Parse and validate settings read from `path`.
    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let issues = settings.validate();
        if !issues.is_empty() {
            return Err(ConfigError::Invalid(issues));
        }
        Ok(settings)
    }
}

/// Load settings from `explicit`, or from the default location.
///
/// An explicit path must exist. A missing file at the default location
/// yields the built-in defaults.
pub fn load(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match default_path() {
            Some(path) => (path, false),
            None => {
                tracing::debug!("no config directory, using defaults");
                return Ok(Settings::default());
            }
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(text) => {
            tracing::debug!(path = %path.display(), "loading config");
            Settings::from_toml(&path, &text)
        }
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Settings::default())
        }
        Err(source) => Err(ConfigError::Read { path, source }),
    }
}

/// `$XDG_CONFIG_HOME/unloadd/config.toml`, falling back to
/// `$HOME/.config/unloadd/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    resolve_default_path(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os("HOME"),
    )
}

fn resolve_default_path(xdg: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let base = match xdg.filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(home.filter(|v| !v.is_empty())?).join(".config"),
    };
    Some(base.join("unloadd").join("config.toml"))
}
