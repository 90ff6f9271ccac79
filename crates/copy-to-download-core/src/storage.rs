// SPDX-License-Identifier: AGPL-3.0
// Copy To Download Core - Public Download directory

use crate::types::AppError;
use std::fs;
use std::path::PathBuf;

/// Resolves the public Download directory copies are placed in
pub trait DownloadDirectory: Send + Sync {
    fn resolve(&self) -> Result<PathBuf, AppError>;
}

/// The current user's Download directory, as reported by the platform.
///
/// The host may pin a different directory through settings; callers of the
/// plugin never choose it.
#[derive(Debug, Clone, Default)]
pub struct UserDownloadDirectory {
    override_dir: Option<PathBuf>,
}

impl UserDownloadDirectory {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }
}

impl DownloadDirectory for UserDownloadDirectory {
    fn resolve(&self) -> Result<PathBuf, AppError> {
        let dir = match &self.override_dir {
            Some(dir) => dir.clone(),
            None => directories::UserDirs::new()
                .and_then(|d| d.download_dir().map(|p| p.to_path_buf()))
                .ok_or_else(|| {
                    AppError::FileIo("Could not determine download directory".to_string())
                })?,
        };

        fs::create_dir_all(&dir)
            .map_err(|e| AppError::FileIo(format!("Failed to create download dir: {}", e)))?;

        Ok(dir)
    }
}

/// A fixed directory, created on demand
#[derive(Debug, Clone)]
pub struct FixedDownloadDirectory(pub PathBuf);

impl DownloadDirectory for FixedDownloadDirectory {
    fn resolve(&self) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.0)
            .map_err(|e| AppError::FileIo(format!("Failed to create download dir: {}", e)))?;
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("Download");

        let resolved = UserDownloadDirectory::new(Some(target.clone()))
            .resolve()
            .unwrap();
        assert_eq!(resolved, target);
        assert!(target.is_dir());
    }

    #[test]
    fn test_fixed_directory_under_a_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        fs::write(&file, b"x").unwrap();

        let err = FixedDownloadDirectory(file.join("Download")).resolve().unwrap_err();
        assert!(matches!(err, AppError::FileIo(_)));
    }
}
