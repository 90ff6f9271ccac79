// SPDX-License-Identifier: AGPL-3.0
// Copy To Download Core - Plugin bridge
//
// Exposes the plugin actions to a host. Commands are handled by a single
// loop task, which owns the permission gate; the copy itself runs on the
// blocking pool and answers on a reply channel private to each call.

use crate::operation::CopyToDownload;
use crate::permission::{
    Admission, PermissionDecision, PermissionGate, PermissionHost, PermissionResponder,
};
use crate::registrar::{DownloadHistory, DownloadRegistrar};
use crate::settings::AppSettings;
use crate::storage::{DownloadDirectory, UserDownloadDirectory};
use crate::types::{arg_string, AppError, Capability, CopyRequest, DownloadHandle, GateDecision, PermissionStatus};
use async_channel::{Receiver, Sender};
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Runtime;

pub const ACTION_COPY_TO_DOWNLOAD: &str = "copyToDownload";
pub const ACTION_COPY_NATIVE_PATHS: &str = "copyNativePaths";

/// What the caller gets back: the success payload, or a readable error
pub type BridgeResult = Result<String, String>;

/// A parsed plugin action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CopyToDownload(CopyRequest),
    CopyNativePaths {
        source_url: String,
        target_dir_url: String,
    },
}

impl Action {
    pub fn parse(name: &str, args: &[Value]) -> Result<Self, AppError> {
        match name {
            ACTION_COPY_TO_DOWNLOAD => Ok(Self::CopyToDownload(CopyRequest::from_args(args)?)),
            ACTION_COPY_NATIVE_PATHS => Ok(Self::CopyNativePaths {
                source_url: arg_string(args, 0)?,
                target_dir_url: arg_string(args, 1)?,
            }),
            other => Err(AppError::UnknownAction(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CopyToDownload(_) => ACTION_COPY_TO_DOWNLOAD,
            Self::CopyNativePaths { .. } => ACTION_COPY_NATIVE_PATHS,
        }
    }
}

/// Commands that can be sent to the bridge
#[derive(Debug)]
pub enum BridgeCommand {
    Execute {
        action: String,
        args: Vec<Value>,
        reply: Sender<BridgeResult>,
    },
    /// A permission decision delivered by the host out of band
    PermissionResult {
        request_code: i32,
        grant_results: Vec<PermissionStatus>,
    },
}

/// Things frontends may want to show the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    PermissionRequested {
        request_code: i32,
        capability: Capability,
    },
    DownloadRegistered {
        handle: DownloadHandle,
        title: String,
        show_notification: bool,
    },
    RequestFailed {
        action: String,
        error: String,
    },
}

/// A call parked behind the permission prompt
struct DeferredCall {
    action: Action,
    reply: Sender<BridgeResult>,
}

/// Bridge between a host and the copy operation.
///
/// Owns its runtime; drop it from synchronous code.
pub struct PluginBridge {
    command_tx: Sender<BridgeCommand>,
    event_rx: Receiver<BridgeEvent>,
    _runtime: Arc<Runtime>,
}

impl PluginBridge {
    /// Build a bridge with the desktop registrar and Download directory from settings
    pub fn from_settings<H>(host: H, settings: &AppSettings) -> Result<Self, AppError>
    where
        H: PermissionHost + 'static,
    {
        let history = DownloadHistory::new(settings.history_limit)?;
        let download_dir = UserDownloadDirectory::new(settings.download_dir.clone());
        let operation = CopyToDownload::new(history, download_dir, settings.copy_options());
        Self::new(host, operation, settings.max_pending)
    }

    pub fn new<H, R, D>(
        host: H,
        operation: CopyToDownload<R, D>,
        max_pending: usize,
    ) -> Result<Self, AppError>
    where
        H: PermissionHost + 'static,
        R: DownloadRegistrar + 'static,
        D: DownloadDirectory + 'static,
    {
        let (command_tx, command_rx) = async_channel::bounded::<BridgeCommand>(32);
        let (event_tx, event_rx) = async_channel::bounded::<BridgeEvent>(64);
        let (decision_tx, decision_rx) = async_channel::unbounded::<PermissionDecision>();

        let runtime = Arc::new(
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| AppError::Runtime(format!("Failed to create Tokio runtime: {}", e)))?,
        );

        let gate = PermissionGate::new(host, PermissionResponder::new(decision_tx), max_pending);
        let operation = Arc::new(operation);

        let rt = runtime.clone();
        runtime.spawn(async move {
            Self::run(gate, operation, command_rx, decision_rx, event_tx).await;
        });

        Ok(Self {
            command_tx,
            event_rx,
            _runtime: rt,
        })
    }

    async fn run<H, R, D>(
        gate: PermissionGate<H, DeferredCall>,
        operation: Arc<CopyToDownload<R, D>>,
        command_rx: Receiver<BridgeCommand>,
        decision_rx: Receiver<PermissionDecision>,
        event_tx: Sender<BridgeEvent>,
    ) where
        H: PermissionHost + 'static,
        R: DownloadRegistrar + 'static,
        D: DownloadDirectory + 'static,
    {
        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Ok(BridgeCommand::Execute { action, args, reply }) => {
                            Self::execute_action(&gate, &operation, &event_tx, &action, &args, reply);
                        }
                        Ok(BridgeCommand::PermissionResult { request_code, grant_results }) => {
                            Self::resolve(&gate, &operation, &event_tx, request_code, &grant_results);
                        }
                        Err(_) => break,
                    }
                }
                decision = decision_rx.recv() => {
                    if let Ok(decision) = decision {
                        Self::resolve(
                            &gate,
                            &operation,
                            &event_tx,
                            decision.request_code,
                            &decision.grant_results,
                        );
                    }
                }
            }
        }
        tracing::debug!("Plugin bridge command loop stopped");
    }

    fn execute_action<H, R, D>(
        gate: &PermissionGate<H, DeferredCall>,
        operation: &Arc<CopyToDownload<R, D>>,
        event_tx: &Sender<BridgeEvent>,
        name: &str,
        args: &[Value],
        reply: Sender<BridgeResult>,
    ) where
        H: PermissionHost + 'static,
        R: DownloadRegistrar + 'static,
        D: DownloadDirectory + 'static,
    {
        let action = match Action::parse(name, args) {
            Ok(action) => action,
            Err(e) => {
                tracing::error!("Rejected {} call: {}", name, e);
                let _ = reply.try_send(Err(e.to_string()));
                return;
            }
        };

        let overflow_reply = reply.clone();
        let admission = gate.ensure_write_access(DeferredCall { action, reply });
        if let Ok(admitted) = &admission {
            tracing::debug!("{} call admitted: {:?}", name, admitted.decision());
        }

        match admission {
            Ok(Admission::Granted(call)) => Self::dispatch(operation.clone(), event_tx.clone(), call),
            Ok(Admission::Pending(token)) => {
                tracing::info!("{} call {} waiting for permission", name, token);
                // First request in the queue means a fresh prompt went out
                if gate.pending_count() == 1 {
                    let _ = event_tx.try_send(BridgeEvent::PermissionRequested {
                        request_code: gate.request_code(),
                        capability: gate.capability(),
                    });
                }
            }
            Err(e) => {
                tracing::error!("Rejected {} call: {}", name, e);
                let _ = overflow_reply.try_send(Err(e.to_string()));
            }
        }
    }

    fn resolve<H, R, D>(
        gate: &PermissionGate<H, DeferredCall>,
        operation: &Arc<CopyToDownload<R, D>>,
        event_tx: &Sender<BridgeEvent>,
        request_code: i32,
        grant_results: &[PermissionStatus],
    ) where
        H: PermissionHost + 'static,
        R: DownloadRegistrar + 'static,
        D: DownloadDirectory + 'static,
    {
        let Some(resolution) = gate.on_request_permission_result(request_code, grant_results) else {
            return;
        };

        let granted = resolution.decision == GateDecision::Granted;
        for (token, call) in resolution.requests {
            if granted {
                tracing::debug!("Resuming call {}", token);
                Self::dispatch(operation.clone(), event_tx.clone(), call);
            } else {
                let error = AppError::PermissionDenied.to_string();
                let _ = event_tx.try_send(BridgeEvent::RequestFailed {
                    action: call.action.name().to_string(),
                    error: error.clone(),
                });
                let _ = call.reply.try_send(Err(error));
            }
        }
    }

    /// Run an admitted call on the blocking pool and answer its caller
    fn dispatch<R, D>(operation: Arc<CopyToDownload<R, D>>, event_tx: Sender<BridgeEvent>, call: DeferredCall)
    where
        R: DownloadRegistrar + 'static,
        D: DownloadDirectory + 'static,
    {
        tokio::spawn(async move {
            let DeferredCall { action, reply } = call;
            let name = action.name();

            let job_action = action.clone();
            let outcome = tokio::task::spawn_blocking(move || run_action(&operation, &job_action))
                .await
                .unwrap_or_else(|e| Err(AppError::Runtime(format!("Copy task failed: {}", e))));

            let result = match outcome {
                Ok(ActionOutput::Registered(handle)) => {
                    if let Action::CopyToDownload(request) = &action {
                        let event = BridgeEvent::DownloadRegistered {
                            handle,
                            title: request.title.clone(),
                            show_notification: request.show_notification,
                        };
                        if event_tx.try_send(event).is_err() {
                            tracing::debug!("Event channel full or closed, dropping event");
                        }
                    }
                    Ok(handle.to_string())
                }
                Ok(ActionOutput::Copied(url)) => Ok(url),
                Err(e) => {
                    tracing::error!("{} failed: {}", name, e);
                    let _ = event_tx.try_send(BridgeEvent::RequestFailed {
                        action: name.to_string(),
                        error: e.to_string(),
                    });
                    Err(e.to_string())
                }
            };

            // The caller may have given up; nothing to do then
            let _ = reply.send(result).await;
        });
    }

    /// Invoke an action and wait for its result
    pub async fn execute(&self, action: &str, args: Vec<Value>) -> BridgeResult {
        let (reply_tx, reply_rx) = async_channel::bounded(1);

        self.command_tx
            .send(BridgeCommand::Execute {
                action: action.to_string(),
                args,
                reply: reply_tx,
            })
            .await
            .map_err(|_| AppError::BridgeClosed.to_string())?;

        reply_rx
            .recv()
            .await
            .map_err(|_| AppError::BridgeClosed.to_string())?
    }

    /// Blocking form of [`execute`](Self::execute), for hosts without an async context
    pub fn execute_blocking(&self, action: &str, args: Vec<Value>) -> BridgeResult {
        let (reply_tx, reply_rx) = async_channel::bounded(1);

        self.command_tx
            .send_blocking(BridgeCommand::Execute {
                action: action.to_string(),
                args,
                reply: reply_tx,
            })
            .map_err(|_| AppError::BridgeClosed.to_string())?;

        reply_rx
            .recv_blocking()
            .map_err(|_| AppError::BridgeClosed.to_string())?
    }

    /// Start an action without waiting; the result arrives on the returned receiver
    pub fn submit(&self, action: &str, args: Vec<Value>) -> Result<Receiver<BridgeResult>, AppError> {
        let (reply_tx, reply_rx) = async_channel::bounded(1);

        self.command_tx
            .send_blocking(BridgeCommand::Execute {
                action: action.to_string(),
                args,
                reply: reply_tx,
            })
            .map_err(|_| AppError::BridgeClosed)?;

        Ok(reply_rx)
    }

    /// Deliver a permission decision on behalf of the host
    pub fn permission_result(
        &self,
        request_code: i32,
        grant_results: Vec<PermissionStatus>,
    ) -> Result<(), AppError> {
        self.command_tx
            .send_blocking(BridgeCommand::PermissionResult {
                request_code,
                grant_results,
            })
            .map_err(|_| AppError::BridgeClosed)
    }

    pub fn event_receiver(&self) -> Receiver<BridgeEvent> {
        self.event_rx.clone()
    }
}

enum ActionOutput {
    Registered(DownloadHandle),
    Copied(String),
}

fn run_action<R, D>(operation: &CopyToDownload<R, D>, action: &Action) -> Result<ActionOutput, AppError>
where
    R: DownloadRegistrar,
    D: DownloadDirectory,
{
    match action {
        Action::CopyToDownload(request) => operation
            .copy_and_register(request)
            .map(ActionOutput::Registered),
        Action::CopyNativePaths {
            source_url,
            target_dir_url,
        } => operation
            .copy_native_paths(source_url, target_dir_url)
            .map(ActionOutput::Copied),
    }
}
