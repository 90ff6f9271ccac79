// SPDX-License-Identifier: AGPL-3.0
// Copy To Download CLI - Main entry point
//
// Desktop host for the copy-to-download plugin.

mod host;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use copy_to_download_core::bridge::{ACTION_COPY_NATIVE_PATHS, ACTION_COPY_TO_DOWNLOAD};
use copy_to_download_core::{AppSettings, BridgeEvent, DownloadHistory, PluginBridge, SettingsStore};
use host::{PromptMode, TerminalPermissionHost};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

#[derive(Parser)]
#[command(
    name = "copy-to-download",
    version,
    about = "Copy a file into the Download directory and register it as a download"
)]
struct Cli {
    /// Settings file to use instead of the per-user one
    #[arg(long, env = "COPY_TO_DOWNLOAD_SETTINGS")]
    settings: Option<PathBuf>,

    /// Grant write access without asking
    #[arg(long, short = 'y', conflicts_with = "deny")]
    yes: bool,

    /// Refuse write access without asking
    #[arg(long)]
    deny: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy a file into the Download directory and register it
    Copy {
        /// `file://` URI or absolute path of the file to copy
        path: String,
        /// Title shown in the downloads list (defaults to the file name)
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "application/octet-stream")]
        mime_type: String,
        /// Let media indexers pick up the copy
        #[arg(long)]
        scannable: bool,
        /// Show a notification once the download is registered
        #[arg(long)]
        notify: bool,
        /// Override the Download directory for this run
        #[arg(long)]
        download_dir: Option<PathBuf>,
        /// Copy buffer size in bytes
        #[arg(long)]
        buffer_size: Option<usize>,
        /// Stage the copy in a temporary file and rename it into place
        #[arg(long)]
        atomic: bool,
    },
    /// Copy a file into a directory, both given as file URLs
    CopyNative {
        source_url: String,
        target_dir_url: String,
    },
    /// List registered downloads
    History,
    /// Forget all registered downloads
    ClearHistory,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("copy_to_download=info".parse().unwrap())
                .add_directive("copy_to_download_core=info".parse().unwrap()),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let store = match &cli.settings {
        Some(path) => SettingsStore::open(path.clone()),
        None => SettingsStore::new(),
    }
    .context("Failed to load settings")?;
    let mut settings = store.get();

    let mode = if cli.yes {
        PromptMode::AssumeYes
    } else if cli.deny {
        PromptMode::AssumeNo
    } else {
        PromptMode::Ask
    };

    match cli.command {
        Command::Copy {
            path,
            title,
            description,
            mime_type,
            scannable,
            notify,
            download_dir,
            buffer_size,
            atomic,
        } => {
            if download_dir.is_some() {
                settings.download_dir = download_dir;
            }
            if let Some(size) = buffer_size {
                settings.buffer_size = size;
            }
            settings.atomic_copy |= atomic;

            let title = title.unwrap_or_else(|| default_title(&path));
            let args = vec![
                json!(path),
                json!(title),
                json!(description),
                json!(scannable),
                json!(mime_type),
                json!(notify),
            ];

            let handle = invoke(&settings, mode, ACTION_COPY_TO_DOWNLOAD, args)?;
            println!("{}", handle);
        }
        Command::CopyNative {
            source_url,
            target_dir_url,
        } => {
            let args = vec![json!(source_url), json!(target_dir_url)];
            let url = invoke(&settings, mode, ACTION_COPY_NATIVE_PATHS, args)?;
            println!("{}", url);
        }
        Command::History => {
            let history = DownloadHistory::new(settings.history_limit)?;
            println!("{}", serde_json::to_string_pretty(&history.list())?);
        }
        Command::ClearHistory => {
            let history = DownloadHistory::new(settings.history_limit)?;
            history.clear()?;
            tracing::info!("Download history cleared");
        }
    }

    Ok(())
}

/// Run one plugin action through the bridge and wait for its result
fn invoke(
    settings: &AppSettings,
    mode: PromptMode,
    action: &str,
    args: Vec<serde_json::Value>,
) -> Result<String> {
    let bridge = PluginBridge::from_settings(TerminalPermissionHost::new(mode), settings)?;

    // Event listener, standing in for system notifications
    let events = bridge.event_receiver();
    let listener = thread::spawn(move || {
        while let Ok(event) = events.recv_blocking() {
            match event {
                BridgeEvent::DownloadRegistered {
                    title,
                    show_notification: true,
                    ..
                } => eprintln!("Download complete: {}", title),
                BridgeEvent::PermissionRequested {
                    request_code,
                    capability,
                } => {
                    tracing::debug!("Waiting for {} decision (request code {})", capability, request_code);
                }
                _ => {}
            }
        }
    });

    let result = bridge.execute_blocking(action, args);

    drop(bridge);
    let _ = listener.join();

    result.map_err(anyhow::Error::msg)
}

fn default_title(reference: &str) -> String {
    reference
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(reference)
        .to_string()
}
