// SPDX-License-Identifier: AGPL-3.0
// Copy To Download Core - Source reference resolution
//
// A source reference is either a `file://` URI or an absolute path.

use crate::types::AppError;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// A source file that exists and can be copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file_name: OsString,
}

/// Resolve a reference to an existing regular file
pub fn resolve_source(reference: &str) -> Result<SourceFile, AppError> {
    let path = reference_to_path(reference)?;

    let metadata = fs::metadata(&path)
        .map_err(|e| AppError::NotFound(format!("{}: {}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(AppError::NotFound(format!(
            "{}: not a regular file",
            path.display()
        )));
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| AppError::NotFound(format!("{}: has no file name", path.display())))?;

    Ok(SourceFile { path, file_name })
}

/// Turn a URI or path string into an absolute local path, without touching the filesystem
pub fn reference_to_path(reference: &str) -> Result<PathBuf, AppError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(AppError::NotFound("Empty source reference".to_string()));
    }

    let as_path = Path::new(trimmed);
    if as_path.is_absolute() {
        return Ok(as_path.to_path_buf());
    }

    let url = Url::parse(trimmed)
        .map_err(|e| AppError::NotFound(format!("Invalid source reference {:?}: {}", trimmed, e)))?;
    file_url_to_path(&url)
}

/// Convert a parsed `file://` URL to a local path
pub fn file_url_to_path(url: &Url) -> Result<PathBuf, AppError> {
    if url.scheme() != "file" {
        return Err(AppError::NotFound(format!(
            "URI scheme is not \"file\": {}",
            url
        )));
    }
    if url.query().is_some() {
        return Err(AppError::NotFound(format!("URI has a query component: {}", url)));
    }
    if url.fragment().is_some() {
        return Err(AppError::NotFound(format!(
            "URI has a fragment component: {}",
            url
        )));
    }

    url.to_file_path()
        .map_err(|_| AppError::NotFound(format!("URI is not a local file: {}", url)))
}

/// Render a local path as a `file://` URL
pub fn path_to_url(path: &Path) -> Result<String, AppError> {
    Url::from_file_path(path)
        .map(|u| u.to_string())
        .map_err(|_| AppError::NotFound(format!("Not an absolute path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_absolute_path_and_uri_resolve_alike() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.csv");
        File::create(&file).unwrap();

        let by_path = resolve_source(file.to_str().unwrap()).unwrap();
        let uri = Url::from_file_path(&file).unwrap().to_string();
        let by_uri = resolve_source(&uri).unwrap();

        assert_eq!(by_path, by_uri);
        assert_eq!(by_path.file_name, OsString::from("report.csv"));
    }

    #[test]
    fn test_percent_encoded_uri() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("monthly report.csv");
        File::create(&file).unwrap();

        let uri = Url::from_file_path(&file).unwrap().to_string();
        assert!(uri.contains("%20"));
        assert_eq!(resolve_source(&uri).unwrap().path, file);
    }

    #[test]
    fn test_malformed_references_are_not_found() {
        for reference in ["", "report.csv", "http://example.com/report.csv", "file:///tmp/a?x=1", "::::"] {
            let err = resolve_source(reference).unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)), "{reference}: {err:?}");
        }
    }

    #[test]
    fn test_missing_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");

        let err = resolve_source(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m.contains("missing.bin")));

        let err = resolve_source(dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m.contains("not a regular file")));
    }
}
