// SPDX-License-Identifier: AGPL-3.0
// Copy To Download Core - Copy and register
//
// Resolve -> Copy -> Register. Any failure ends the request; nothing is
// retried and a partially written destination is left as is.

use crate::copy::{copy_file, CopyOptions};
use crate::registrar::{CompletedDownload, DownloadRegistrar};
use crate::source::{path_to_url, reference_to_path, resolve_source};
use crate::storage::DownloadDirectory;
use crate::types::{AppError, CopyRequest, DownloadHandle};
use std::fs;
use std::path::PathBuf;

/// Copies files into the Download directory and registers them
pub struct CopyToDownload<R, D> {
    registrar: R,
    download_dir: D,
    options: CopyOptions,
}

impl<R: DownloadRegistrar, D: DownloadDirectory> CopyToDownload<R, D> {
    pub fn new(registrar: R, download_dir: D, options: CopyOptions) -> Self {
        Self {
            registrar,
            download_dir,
            options,
        }
    }

    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    /// Copy the request's source into the Download directory under the same
    /// file name, then register it. A same-named file already there is
    /// overwritten.
    pub fn copy_and_register(&self, request: &CopyRequest) -> Result<DownloadHandle, AppError> {
        let source = resolve_source(&request.source_reference)?;
        let target_dir = self.download_dir.resolve()?;
        let target = target_dir.join(&source.file_name);

        let written = copy_file(&source.path, &target, self.options)?;
        tracing::debug!("Copied {} bytes from {:?} to {:?}", written, source.path, target);

        let length = fs::metadata(&target)
            .map_err(|e| AppError::FileIo(format!("{}: {}", target.display(), e)))?
            .len();

        self.registrar.add_completed_download(CompletedDownload {
            title: request.title.clone(),
            description: request.description.clone(),
            scannable: request.scannable,
            mime_type: request.mime_type.clone(),
            path: target,
            length,
            show_notification: request.show_notification,
        })
    }

    /// Copy a file into an arbitrary directory, both given as `file://`
    /// URLs or absolute paths, and return the URL of the copy. Nothing is
    /// registered.
    pub fn copy_native_paths(&self, source_url: &str, target_dir_url: &str) -> Result<String, AppError> {
        let source = resolve_source(source_url)?;
        let target_dir = directory_path(target_dir_url)?;
        let target = target_dir.join(&source.file_name);

        copy_file(&source.path, &target, self.options)?;
        path_to_url(&target)
    }
}

fn directory_path(reference: &str) -> Result<PathBuf, AppError> {
    let path = reference_to_path(reference)?;

    let metadata = fs::metadata(&path)
        .map_err(|e| AppError::NotFound(format!("{}: {}", path.display(), e)))?;
    if !metadata.is_dir() {
        return Err(AppError::NotFound(format!(
            "{}: not a directory",
            path.display()
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FixedDownloadDirectory;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRegistrar {
        calls: Mutex<Vec<CompletedDownload>>,
        fail: bool,
    }

    impl DownloadRegistrar for RecordingRegistrar {
        fn add_completed_download(&self, download: CompletedDownload) -> Result<DownloadHandle, AppError> {
            if self.fail {
                return Err(AppError::Registrar("service unavailable".to_string()));
            }
            let mut calls = self.calls.lock().unwrap();
            calls.push(download);
            Ok(DownloadHandle(calls.len() as u64 + 40))
        }
    }

    fn request(source: &std::path::Path) -> CopyRequest {
        CopyRequest {
            source_reference: source.to_string_lossy().into_owned(),
            title: "Report".to_string(),
            description: "Monthly report".to_string(),
            scannable: true,
            mime_type: "text/csv".to_string(),
            show_notification: true,
        }
    }

    #[test]
    fn test_report_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let src_dir = dir.path().join("foo");
        fs::create_dir_all(&src_dir).unwrap();
        let src = src_dir.join("report.csv");
        fs::write(&src, b"month,total\njan,10\n").unwrap();
        let downloads = dir.path().join("Download");

        let op = CopyToDownload::new(
            RecordingRegistrar::default(),
            FixedDownloadDirectory(downloads.clone()),
            CopyOptions::default(),
        );
        let handle = op.copy_and_register(&request(&src)).unwrap();
        assert_eq!(handle.to_string(), "41");

        let target = downloads.join("report.csv");
        assert_eq!(fs::read(&target).unwrap(), fs::read(&src).unwrap());

        let calls = op.registrar().calls.lock().unwrap();
        assert_eq!(
            calls[0],
            CompletedDownload {
                title: "Report".to_string(),
                description: "Monthly report".to_string(),
                scannable: true,
                mime_type: "text/csv".to_string(),
                path: target,
                length: 19,
                show_notification: true,
            }
        );
    }

    #[test]
    fn test_malformed_reference_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("Download");
        let op = CopyToDownload::new(
            RecordingRegistrar::default(),
            FixedDownloadDirectory(downloads.clone()),
            CopyOptions::default(),
        );

        let mut req = request(&dir.path().join("x"));
        req.source_reference = "not a uri".to_string();
        let err = op.copy_and_register(&req).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!downloads.exists());
        assert!(op.registrar().calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_registrar_failure_is_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"abc").unwrap();

        let op = CopyToDownload::new(
            RecordingRegistrar {
                fail: true,
                ..Default::default()
            },
            FixedDownloadDirectory(dir.path().join("Download")),
            CopyOptions::default(),
        );
        let err = op.copy_and_register(&request(&src)).unwrap_err();
        assert_eq!(err, AppError::Registrar("service unavailable".to_string()));
    }

    #[test]
    fn test_copy_native_paths_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("photo.jpg");
        fs::write(&src, b"jpeg").unwrap();
        let target_dir = dir.path().join("out");
        fs::create_dir_all(&target_dir).unwrap();

        let op = CopyToDownload::new(
            RecordingRegistrar::default(),
            FixedDownloadDirectory(dir.path().join("Download")),
            CopyOptions::default(),
        );
        let source_url = url::Url::from_file_path(&src).unwrap().to_string();
        let dir_url = url::Url::from_file_path(&target_dir).unwrap().to_string();

        let copied = op.copy_native_paths(&source_url, &dir_url).unwrap();
        let expected = url::Url::from_file_path(target_dir.join("photo.jpg")).unwrap();
        assert_eq!(copied, expected.to_string());
        assert_eq!(fs::read(target_dir.join("photo.jpg")).unwrap(), b"jpeg");
        assert!(op.registrar().calls.lock().unwrap().is_empty());

        let err = op.copy_native_paths(&source_url, &source_url).unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m.contains("not a directory")));
    }
    #[test]
    fn test_file_already_in_download_dir_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("Download");
        fs::create_dir_all(&downloads).unwrap();
        let src = downloads.join("report.csv");
        fs::write(&src, b"month,total\njan,10\n").unwrap();

        let op = CopyToDownload::new(
            RecordingRegistrar::default(),
            FixedDownloadDirectory(downloads.clone()),
            CopyOptions::default(),
        );
        op.copy_and_register(&request(&src)).unwrap();

        assert_eq!(fs::read(&src).unwrap(), b"month,total\njan,10\n");
        let calls = op.registrar().calls.lock().unwrap();
        assert_eq!(calls[0].path, src);
        assert_eq!(calls[0].length, 19);
    }

    #[test]
    fn test_copy_native_paths_into_own_directory() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("photo.jpg");
        fs::write(&src, b"jpeg").unwrap();

        let op = CopyToDownload::new(
            RecordingRegistrar::default(),
            FixedDownloadDirectory(dir.path().join("Download")),
            CopyOptions::default(),
        );
        let source_url = url::Url::from_file_path(&src).unwrap().to_string();
        let dir_url = url::Url::from_file_path(dir.path()).unwrap().to_string();

        let copied = op.copy_native_paths(&source_url, &dir_url).unwrap();
        assert_eq!(copied, source_url);
        assert_eq!(fs::read(&src).unwrap(), b"jpeg");
    }
}
