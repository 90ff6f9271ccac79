// SPDX-License-Identifier: AGPL-3.0
// Copy To Download Core - Settings persistence
//
// Host-side settings are stored in a local JSON file. Callers of the
// plugin cannot change any of these.

use crate::copy::{CopyOptions, DEFAULT_BUFFER_SIZE};
use crate::registrar::MAX_HISTORY_ENTRIES;
use crate::types::AppError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Default number of requests that may wait on one permission prompt
pub const DEFAULT_MAX_PENDING: usize = 16;

/// Plugin settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Pin the Download directory instead of asking the platform
    pub download_dir: Option<PathBuf>,
    /// Size of the intermediate copy buffer in bytes
    pub buffer_size: usize,
    /// Stage copies in a temporary file and rename them into place
    pub atomic_copy: bool,
    /// Requests allowed to wait on a single permission prompt
    pub max_pending: usize,
    /// Number of download records kept by the registrar
    pub history_limit: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            download_dir: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            atomic_copy: false,
            max_pending: DEFAULT_MAX_PENDING,
            history_limit: MAX_HISTORY_ENTRIES,
        }
    }
}

impl AppSettings {
    pub fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            buffer_size: self.buffer_size.max(1),
            atomic: self.atomic_copy,
        }
    }
}

/// Per-user config directory, created if missing
pub(crate) fn config_dir() -> Result<PathBuf, AppError> {
    let config_dir = directories::ProjectDirs::from("com", "tonib", "copytodownload")
        .ok_or_else(|| AppError::FileIo("Could not determine config directory".to_string()))?
        .config_dir()
        .to_path_buf();

    fs::create_dir_all(&config_dir)
        .map_err(|e| AppError::FileIo(format!("Failed to create config dir: {}", e)))?;

    Ok(config_dir)
}

/// In-memory cache of settings, persisted to disk on changes
pub struct SettingsStore {
    settings: RwLock<AppSettings>,
    file_path: PathBuf,
}

impl SettingsStore {
    /// Open the settings in the user's config directory
    pub fn new() -> Result<Self, AppError> {
        Self::open(config_dir()?.join("settings.json"))
    }

    /// Open settings at an explicit location, writing defaults if the file is missing
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let file_path = file_path.into();
        tracing::info!("Settings file path: {:?}", file_path);

        let settings = if file_path.exists() {
            let content = fs::read_to_string(&file_path)
                .map_err(|e| AppError::FileIo(format!("Failed to read settings: {}", e)))?;

            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse settings, using defaults: {}", e);
                AppSettings::default()
            })
        } else {
            tracing::info!("No settings file found, using defaults");
            AppSettings::default()
        };

        let store = Self {
            settings: RwLock::new(settings),
            file_path,
        };

        if !store.file_path.exists() {
            tracing::info!("Creating initial settings file");
            store.persist()?;
        }

        Ok(store)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn persist(&self) -> Result<(), AppError> {
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::FileIo(format!("Failed to create config dir: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(&*settings)
            .map_err(|e| AppError::Serialization(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&self.file_path, content)
            .map_err(|e| AppError::FileIo(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> AppSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace settings and persist to disk
    pub fn update(&self, new_settings: AppSettings) -> Result<(), AppError> {
        {
            let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            *settings = new_settings;
        }

        let result = self.persist();
        if let Err(e) = &result {
            tracing::error!("Failed to persist settings: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.buffer_size, 1024);
        assert_eq!(settings.max_pending, 16);
        assert!(!settings.atomic_copy);
        assert!(settings.download_dir.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: AppSettings = serde_json::from_str(r#"{"atomicCopy": true}"#).unwrap();
        assert!(settings.atomic_copy);
        assert_eq!(settings.history_limit, MAX_HISTORY_ENTRIES);
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("settings.json");

        let store = SettingsStore::open(&path).unwrap();
        assert!(path.exists());

        let mut settings = store.get();
        settings.buffer_size = 4096;
        settings.download_dir = Some(dir.path().join("Download"));
        store.update(settings.clone()).unwrap();

        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(reopened.get(), settings);
        assert_eq!(reopened.get().copy_options().buffer_size, 4096);
    }

    #[test]
    fn test_garbage_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "[1, 2").unwrap();

        let store = SettingsStore::open(&path).unwrap();
        assert_eq!(store.get(), AppSettings::default());
    }
}
