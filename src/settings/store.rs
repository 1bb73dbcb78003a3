// Settings storage: load, shallow merge, save

use crate::settings::types::Settings;
use crate::settings::{Result, SettingsError};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Holds the current settings for the session.
///
/// The router reads a snapshot on every call; writes only happen through
/// [`SettingsStore::save`] and [`SettingsStore::reload`].
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings from `path`, falling back to defaults
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = read_settings(&path);
        info!(
            path = %path.display(),
            remote = settings.ssh.enabled,
            "settings loaded"
        );
        Self {
            path: Some(path),
            current: RwLock::new(settings),
        }
    }

    /// Store with no backing file
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            current: RwLock::new(settings),
        }
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> Settings {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merge `patch` over the current settings and persist the result
    pub fn save(&self, patch: Value) -> Result<Settings> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);

        let base = serde_json::to_value(&*current)?;
        let merged: Settings = serde_json::from_value(shallow_merge(base, patch)?)?;
        merged.transport()?;

        if let Some(path) = &self.path {
            write_settings(path, &merged)?;
        }

        *current = merged.clone();
        info!(remote = merged.ssh.enabled, "settings saved");
        Ok(merged)
    }

    /// Re-read the backing file, replacing the in-memory settings
    pub fn reload(&self) -> Settings {
        let Some(path) = &self.path else {
            debug!("settings store has no backing file, reload skipped");
            return self.snapshot();
        };
        let settings = read_settings(path);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        info!(path = %path.display(), "settings reloaded");
        settings
    }
}

/// Top-level keys of `patch` replace those of `base`
pub fn shallow_merge(base: Value, patch: Value) -> Result<Value> {
    let Value::Object(mut base) = base else {
        return Err(SettingsError::Invalid("settings must be an object".to_string()));
    };
    let Value::Object(patch) = patch else {
        return Err(SettingsError::Invalid(
            "settings patch must be an object".to_string(),
        ));
    };
    for (key, value) in patch {
        base.insert(key, value);
    }
    Ok(Value::Object(base))
}

fn read_settings(path: &Path) -> Settings {
    if !path.exists() {
        debug!(path = %path.display(), "settings file not found, using defaults");
        return Settings::default();
    }

    match try_read_settings(path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "failed to load settings, using defaults");
            Settings::default()
        }
    }
}

fn try_read_settings(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .map_err(|e| SettingsError::ReadFailed(path.to_path_buf(), e.to_string()))?;
    let file: Value = serde_json::from_str(&content)?;
    let defaults = serde_json::to_value(Settings::default())?;
    let merged = shallow_merge(defaults, file)?;
    Ok(serde_json::from_value(merged)?)
}

fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| SettingsError::WriteFailed(path.to_path_buf(), e.to_string()))?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    fs::write(path, content)
        .map_err(|e| SettingsError::WriteFailed(path.to_path_buf(), e.to_string()))?;
    debug!(path = %path.display(), "settings written");
    Ok(())
}
