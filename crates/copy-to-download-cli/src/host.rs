// SPDX-License-Identifier: AGPL-3.0
// Copy To Download CLI - Terminal permission host
//
// The desktop has no storage permission of its own, so the user is asked
// on the terminal once per process.

use copy_to_download_core::{Capability, PermissionHost, PermissionResponder, PermissionStatus};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// How permission prompts are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Ask,
    AssumeYes,
    AssumeNo,
}

pub struct TerminalPermissionHost {
    granted: Arc<AtomicBool>,
    mode: PromptMode,
}

impl TerminalPermissionHost {
    pub fn new(mode: PromptMode) -> Self {
        Self {
            granted: Arc::new(AtomicBool::new(mode == PromptMode::AssumeYes)),
            mode,
        }
    }
}

impl PermissionHost for TerminalPermissionHost {
    fn has_permission(&self, _capability: Capability) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request_permission(
        &self,
        request_code: i32,
        capability: Capability,
        responder: PermissionResponder,
    ) {
        if self.mode == PromptMode::AssumeNo {
            responder.respond(request_code, vec![PermissionStatus::Denied]);
            return;
        }

        let granted = self.granted.clone();
        // Reading stdin blocks; keep it off the bridge's runtime
        thread::spawn(move || {
            let status = if ask(capability) {
                granted.store(true, Ordering::SeqCst);
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            };

            if !responder.respond(request_code, vec![status]) {
                tracing::warn!("Permission answer dropped, bridge already closed");
            }
        });
    }
}

fn ask(capability: Capability) -> bool {
    let mut stderr = io::stderr();
    let _ = write!(
        stderr,
        "Allow copying into the Download directory ({})? [y/N] ",
        capability
    );
    let _ = stderr.flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => is_yes(&line),
        Err(e) => {
            tracing::warn!("Could not read permission answer: {}", e);
            false
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }

    #[test]
    fn test_assume_modes() {
        let yes = TerminalPermissionHost::new(PromptMode::AssumeYes);
        assert!(yes.has_permission(Capability::WriteSharedStorage));

        let no = TerminalPermissionHost::new(PromptMode::AssumeNo);
        assert!(!no.has_permission(Capability::WriteSharedStorage));

        let (tx, rx) = async_channel::unbounded();
        no.request_permission(0, Capability::WriteSharedStorage, PermissionResponder::new(tx));
        let decision = rx.try_recv().unwrap();
        assert_eq!(decision.grant_results, vec![PermissionStatus::Denied]);
    }
}
