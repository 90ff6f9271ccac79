// SPDX-License-Identifier: AGPL-3.0
// Copy To Download Core - Buffered file copy

use crate::types::AppError;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Default size of the intermediate copy buffer
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// How bytes are moved from source to destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    pub buffer_size: usize,
    /// Write to a temporary sibling and rename over the destination on success
    pub atomic: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            atomic: false,
        }
    }
}

/// Copy `source` to `destination`, returning the number of bytes written.
///
/// An existing destination is truncated and overwritten. Without
/// `atomic`, a failed copy leaves whatever was written in place. When
/// `destination` already is `source`, nothing is written and the current
/// length is returned.
pub fn copy_file(source: &Path, destination: &Path, options: CopyOptions) -> Result<u64, AppError> {
    if is_same_file(source, destination) {
        let length = fs::metadata(source)
            .map_err(|e| AppError::FileIo(format!("{}: {}", source.display(), e)))?
            .len();
        tracing::debug!("{:?} is already in place, skipping copy", destination);
        return Ok(length);
    }

    if !options.atomic {
        return stream_copy(source, destination, options.buffer_size);
    }

    let staging = staging_path(destination)?;
    match stream_copy(source, &staging, options.buffer_size) {
        Ok(written) => {
            if let Err(e) = fs::rename(&staging, destination) {
                discard(&staging);
                return Err(AppError::FileIo(format!(
                    "Failed to move {} into place: {}",
                    destination.display(),
                    e
                )));
            }
            Ok(written)
        }
        Err(e) => {
            discard(&staging);
            Err(e)
        }
    }
}

fn stream_copy(source: &Path, destination: &Path, buffer_size: usize) -> Result<u64, AppError> {
    let mut input = File::open(source)
        .map_err(|e| AppError::FileIo(format!("{}: {}", source.display(), e)))?;
    let mut output = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .map_err(|e| AppError::FileIo(format!("{}: {}", destination.display(), e)))?;

    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut written: u64 = 0;

    loop {
        let read = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(AppError::FileIo(format!("{}: {}", source.display(), e)));
            }
        };
        output
            .write_all(&buffer[..read])
            .map_err(|e| AppError::FileIo(format!("{}: {}", destination.display(), e)))?;
        written += read as u64;
    }

    output
        .flush()
        .map_err(|e| AppError::FileIo(format!("{}: {}", destination.display(), e)))?;

    Ok(written)
}

/// Truncating the destination would otherwise empty the source first
fn is_same_file(source: &Path, destination: &Path) -> bool {
    if let (Ok(a), Ok(b)) = (fs::canonicalize(source), fs::canonicalize(destination)) {
        if a == b {
            return true;
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let (Ok(a), Ok(b)) = (fs::metadata(source), fs::metadata(destination)) {
            return a.dev() == b.dev() && a.ino() == b.ino();
        }
    }

    false
}

/// Hidden sibling of the destination, so the final rename stays on one filesystem
fn staging_path(destination: &Path) -> Result<PathBuf, AppError> {
    let name = destination.file_name().ok_or_else(|| {
        AppError::FileIo(format!("{}: has no file name", destination.display()))
    })?;

    let mut staged = std::ffi::OsString::from(".");
    staged.push(name);
    staged.push(format!(".{}.part", uuid::Uuid::new_v4().simple()));

    Ok(destination.with_file_name(staged))
}

/// Best-effort removal; never masks the error that got us here
fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            tracing::debug!("Ignoring cleanup failure for {:?}: {}", path, e);
        }
    }
}
