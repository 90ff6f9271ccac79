// SPDX-License-Identifier: AGPL-3.0
// Copy To Download Core - Download registrar
//
// Completed downloads are recorded in a local JSON file so they show up in
// the downloads list of whatever frontend is hosting the plugin.

use crate::types::{AppError, DownloadHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Default number of history entries to keep
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Everything the registrar is told about a finished copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedDownload {
    pub title: String,
    pub description: String,
    pub scannable: bool,
    pub mime_type: String,
    pub path: PathBuf,
    pub length: u64,
    pub show_notification: bool,
}

/// Records completed downloads and hands back an opaque handle
pub trait DownloadRegistrar: Send + Sync {
    fn add_completed_download(&self, download: CompletedDownload) -> Result<DownloadHandle, AppError>;
}

impl<T: DownloadRegistrar + ?Sized> DownloadRegistrar for Arc<T> {
    fn add_completed_download(&self, download: CompletedDownload) -> Result<DownloadHandle, AppError> {
        (**self).add_completed_download(download)
    }
}

/// A registered download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub handle: DownloadHandle,
    #[serde(flatten)]
    pub download: CompletedDownload,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryFile {
    /// Next handle to give out; handles are never reused
    next_handle: u64,
    records: Vec<DownloadRecord>,
}

/// File-based download history, acting as the desktop download registrar
#[derive(Debug)]
pub struct DownloadHistory {
    state: RwLock<HistoryFile>,
    file_path: PathBuf,
    limit: usize,
}

impl DownloadHistory {
    /// Open the history in the user's config directory
    pub fn new(limit: usize) -> Result<Self, AppError> {
        let file_path = crate::settings::config_dir()?.join("downloads.json");
        Self::open(file_path, limit)
    }

    /// Open the history at an explicit location, loading it if present
    pub fn open(file_path: impl Into<PathBuf>, limit: usize) -> Result<Self, AppError> {
        let file_path = file_path.into();

        let mut state = if file_path.exists() {
            let content = fs::read_to_string(&file_path)
                .map_err(|e| AppError::FileIo(format!("Failed to read download history: {}", e)))?;

            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse download history, starting fresh: {}", e);
                HistoryFile::default()
            })
        } else {
            HistoryFile::default()
        };

        // Older or hand-edited files may lag behind their own records
        let highest = state.records.iter().map(|r| r.handle.0).max().unwrap_or(0);
        state.next_handle = state.next_handle.max(highest + 1);

        Ok(Self {
            state: RwLock::new(state),
            file_path,
            limit: limit.max(1),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn persist(&self, state: &HistoryFile) -> Result<(), AppError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::FileIo(format!("Failed to create history dir: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(state).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize download history: {}", e))
        })?;

        fs::write(&self.file_path, content)
            .map_err(|e| AppError::FileIo(format!("Failed to write download history: {}", e)))?;

        Ok(())
    }

    /// All records, most recent first
    pub fn list(&self) -> Vec<DownloadRecord> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clone()
    }

    pub fn get(&self, handle: DownloadHandle) -> Option<DownloadRecord> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .iter()
            .find(|r| r.handle == handle)
            .cloned()
    }

    /// Record a completed download and return its handle
    pub fn add(&self, download: CompletedDownload) -> Result<DownloadHandle, AppError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let handle = DownloadHandle(state.next_handle);
        let record = DownloadRecord {
            handle,
            download,
            registered_at: Utc::now(),
        };

        let previous_next = state.next_handle;
        let previous_records = state.records.clone();

        state.next_handle += 1;
        state.records.insert(0, record);
        if state.records.len() > self.limit {
            state.records.truncate(self.limit);
        }

        if let Err(e) = self.persist(&state) {
            state.next_handle = previous_next;
            state.records = previous_records;
            return Err(e);
        }

        Ok(handle)
    }

    /// Clear all records. Handles keep counting up.
    pub fn clear(&self) -> Result<(), AppError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.records.clear();
        self.persist(&state)
    }

    pub fn count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }
}

impl DownloadRegistrar for DownloadHistory {
    fn add_completed_download(&self, download: CompletedDownload) -> Result<DownloadHandle, AppError> {
        let title = download.title.clone();
        let handle = self
            .add(download)
            .map_err(|e| AppError::Registrar(e.to_string()))?;
        tracing::info!("Registered download {} ({})", handle, title);
        Ok(handle)
    }
}
