// SPDX-License-Identifier: AGPL-3.0
// Copy To Download Core - Plugin logic shared by all hosts
//
// This crate provides:
// - CopyRequest, DownloadHandle and AppError types
// - PermissionGate for write access to shared storage
// - CopyToDownload, the copy-and-register operation
// - DownloadHistory, a file-backed download registrar
// - SettingsStore for persistent host settings
// - PluginBridge, the `copyToDownload` entry point for hosts
//
// Host-specific code lives in separate crates.

pub mod bridge;
pub mod copy;
pub mod operation;
pub mod permission;
pub mod registrar;
pub mod settings;
pub mod source;
pub mod storage;
pub mod types;

// Re-export commonly used items
pub use bridge::{Action, BridgeCommand, BridgeEvent, BridgeResult, PluginBridge};
pub use copy::{copy_file, CopyOptions};
pub use operation::CopyToDownload;
pub use permission::{
    PermissionDecision, PermissionGate, PermissionHost, PermissionResponder,
    WRITE_STORAGE_REQ_CODE,
};
pub use registrar::{CompletedDownload, DownloadHistory, DownloadRecord, DownloadRegistrar};
pub use settings::{AppSettings, SettingsStore};
pub use storage::{DownloadDirectory, FixedDownloadDirectory, UserDownloadDirectory};
pub use types::{
    AppError, Capability, CopyRequest, DownloadHandle, GateDecision, PermissionStatus,
    RequestToken,
};
