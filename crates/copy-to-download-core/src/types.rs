// SPDX-License-Identifier: AGPL-3.0
// Copy To Download Core - Type definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Number of positional arguments taken by `copyToDownload`
pub const COPY_REQUEST_ARGS: usize = 6;

/// A single copy-to-download invocation, as received from the host bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRequest {
    /// `file://` URI or absolute path of the file to copy
    pub source_reference: String,
    /// Title shown for the entry in the downloads list
    pub title: String,
    /// Description shown for the entry in the downloads list
    pub description: String,
    /// Whether media indexers should pick up the copy
    pub scannable: bool,
    pub mime_type: String,
    /// Whether a user-visible notification should be raised
    pub show_notification: bool,
}

impl CopyRequest {
    /// Build a request from the bridge's positional argument list:
    /// `[path, title, description, isMediaScannerScannable, mimeType, showNotification]`
    pub fn from_args(args: &[Value]) -> Result<Self, AppError> {
        if args.len() < COPY_REQUEST_ARGS {
            return Err(AppError::InvalidArguments(format!(
                "expected {} arguments, got {}",
                COPY_REQUEST_ARGS,
                args.len()
            )));
        }

        Ok(Self {
            source_reference: arg_string(args, 0)?,
            title: arg_string(args, 1)?,
            description: arg_string(args, 2)?,
            scannable: arg_bool(args, 3)?,
            mime_type: arg_string(args, 4)?,
            show_notification: arg_bool(args, 5)?,
        })
    }
}

/// Read a positional string argument
pub fn arg_string(args: &[Value], index: usize) -> Result<String, AppError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(AppError::InvalidArguments(format!(
            "argument {} is not a string",
            index
        ))),
        None => Err(AppError::InvalidArguments(format!(
            "argument {} is missing",
            index
        ))),
    }
}

/// Read a positional boolean argument
pub fn arg_bool(args: &[Value], index: usize) -> Result<bool, AppError> {
    match args.get(index) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(AppError::InvalidArguments(format!(
            "argument {} is not a boolean",
            index
        ))),
        None => Err(AppError::InvalidArguments(format!(
            "argument {} is missing",
            index
        ))),
    }
}

/// Opaque identifier handed back by the download registrar.
///
/// Rendered as a decimal string at the bridge boundary, since not every
/// host can carry a 64-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DownloadHandle(pub u64);

impl fmt::Display for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DownloadHandle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(DownloadHandle)
            .map_err(|e| AppError::InvalidArguments(format!("invalid download handle {:?}: {}", s, e)))
    }
}

/// OS-level permission grants this plugin can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    WriteSharedStorage,
}

impl Capability {
    /// Platform name of the capability
    pub fn name(&self) -> &'static str {
        match self {
            Self::WriteSharedStorage => "WRITE_EXTERNAL_STORAGE",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a permission decision delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Correlation id for a request parked behind a permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(uuid::Uuid);

impl RequestToken {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RequestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of asking the permission gate for write access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Access is held, run now
    Granted,
    /// Access was refused
    Denied,
    /// Parked until the host delivers the user's decision
    PendingUserDecision(RequestToken),
}

/// Error types for the plugin
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    #[error("Permission denied to write to external storage")]
    PermissionDenied,

    #[error("{0}")]
    NotFound(String),

    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("Download registrar error: {0}")]
    Registrar(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Too many requests waiting for permission (limit {0})")]
    TooManyPending(usize),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Plugin bridge is closed")]
    BridgeClosed,
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileIo(err.to_string())
    }
}
