// SPDX-License-Identifier: AGPL-3.0
// Copy To Download Core - Permission gate
//
// Work that needs write access to shared storage either runs straight away
// or waits, under its own token, until the host reports the user's answer.
// One prompt is outstanding at a time; everything that arrives while it is
// open waits on the same answer.

use crate::types::{AppError, Capability, GateDecision, PermissionStatus, RequestToken};
use async_channel::Sender;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Request code used when asking for write access to shared storage
pub const WRITE_STORAGE_REQ_CODE: i32 = 0;

/// The user's answer to a permission prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDecision {
    pub request_code: i32,
    pub grant_results: Vec<PermissionStatus>,
}

/// Handed to the host with each prompt so it can deliver the answer later
#[derive(Debug, Clone)]
pub struct PermissionResponder {
    tx: Sender<PermissionDecision>,
}

impl PermissionResponder {
    pub fn new(tx: Sender<PermissionDecision>) -> Self {
        Self { tx }
    }

    /// Deliver the decision. Returns false if nobody is listening anymore.
    pub fn respond(&self, request_code: i32, grant_results: Vec<PermissionStatus>) -> bool {
        self.tx
            .try_send(PermissionDecision {
                request_code,
                grant_results,
            })
            .is_ok()
    }
}

/// The host's permission subsystem
pub trait PermissionHost: Send + Sync {
    /// Whether the process already holds the capability
    fn has_permission(&self, capability: Capability) -> bool;

    /// Ask the user. The answer comes back through `responder`, possibly
    /// much later and from another thread.
    fn request_permission(
        &self,
        request_code: i32,
        capability: Capability,
        responder: PermissionResponder,
    );
}

/// Result of asking the gate to admit a piece of work
#[derive(Debug)]
pub enum Admission<P> {
    /// Access is held; the work comes straight back to be run
    Granted(P),
    /// Parked until the user decides
    Pending(RequestToken),
}

impl<P> Admission<P> {
    pub fn decision(&self) -> GateDecision {
        match self {
            Self::Granted(_) => GateDecision::Granted,
            Self::Pending(token) => GateDecision::PendingUserDecision(*token),
        }
    }
}

/// Parked work released by a permission decision
#[derive(Debug)]
pub struct Resolution<P> {
    /// Either `Granted` or `Denied`
    pub decision: GateDecision,
    /// Released work in arrival order
    pub requests: Vec<(RequestToken, P)>,
}

struct PendingQueue<P> {
    prompt_outstanding: bool,
    entries: VecDeque<(RequestToken, P)>,
}

/// Gate in front of work that writes to shared storage
pub struct PermissionGate<H, P> {
    host: H,
    capability: Capability,
    request_code: i32,
    max_pending: usize,
    responder: PermissionResponder,
    pending: Mutex<PendingQueue<P>>,
}

impl<H: PermissionHost, P> PermissionGate<H, P> {
    pub fn new(host: H, responder: PermissionResponder, max_pending: usize) -> Self {
        Self {
            host,
            capability: Capability::WriteSharedStorage,
            request_code: WRITE_STORAGE_REQ_CODE,
            max_pending: max_pending.max(1),
            responder,
            pending: Mutex::new(PendingQueue {
                prompt_outstanding: false,
                entries: VecDeque::new(),
            }),
        }
    }

    pub fn request_code(&self) -> i32 {
        self.request_code
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Number of requests waiting on the user
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Admit `work` if write access is held, otherwise park it and make sure
    /// a prompt is on screen.
    pub fn ensure_write_access(&self, work: P) -> Result<Admission<P>, AppError> {
        if self.host.has_permission(self.capability) {
            return Ok(Admission::Granted(work));
        }

        let token = RequestToken::new();
        let needs_prompt = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.entries.len() >= self.max_pending {
                return Err(AppError::TooManyPending(self.max_pending));
            }
            pending.entries.push_back((token, work));

            let needs_prompt = !pending.prompt_outstanding;
            pending.prompt_outstanding = true;
            needs_prompt
        };

        if needs_prompt {
            tracing::info!(
                "Requesting {} permission (request code {})",
                self.capability,
                self.request_code
            );
            // Outside the lock: the host may answer synchronously
            self.host
                .request_permission(self.request_code, self.capability, self.responder.clone());
        } else {
            tracing::debug!("Request {} waiting on the open permission prompt", token);
        }

        Ok(Admission::Pending(token))
    }

    /// Consume the user's decision. Any denial denies everything parked,
    /// and so does an empty result set, which is what a dismissed prompt
    /// reports. Only a non-empty set of grants resumes the parked work.
    ///
    /// Returns `None` when nothing was waiting or the code is not ours; in
    /// that case no state changes.
    pub fn on_request_permission_result(
        &self,
        request_code: i32,
        grant_results: &[PermissionStatus],
    ) -> Option<Resolution<P>> {
        if request_code != self.request_code {
            tracing::warn!(
                "Ignoring permission result for unknown request code {}",
                request_code
            );
            return None;
        }

        let requests: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.entries.is_empty() {
                tracing::warn!("Permission result arrived with no pending request");
                pending.prompt_outstanding = false;
                return None;
            }
            pending.prompt_outstanding = false;
            pending.entries.drain(..).collect()
        };

        // An empty result set means the prompt was dismissed
        let denied = grant_results.is_empty()
            || grant_results.iter().any(|r| *r == PermissionStatus::Denied);

        let decision = if denied {
            tracing::warn!(
                "{} permission denied, failing {} request(s)",
                self.capability,
                requests.len()
            );
            GateDecision::Denied
        } else {
            tracing::info!(
                "{} permission granted, resuming {} request(s)",
                self.capability,
                requests.len()
            );
            GateDecision::Granted
        };

        Some(Resolution { decision, requests })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct FakeHost {
        granted: Arc<AtomicBool>,
        prompts: Arc<AtomicUsize>,
    }

    impl PermissionHost for FakeHost {
        fn has_permission(&self, _capability: Capability) -> bool {
            self.granted.load(Ordering::SeqCst)
        }

        fn request_permission(&self, _code: i32, _capability: Capability, _responder: PermissionResponder) {
            self.prompts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn gate(host: FakeHost, max_pending: usize) -> PermissionGate<FakeHost, &'static str> {
        let (tx, _rx) = async_channel::unbounded();
        PermissionGate::new(host, PermissionResponder::new(tx), max_pending)
    }

    #[test]
    fn test_granted_runs_immediately() {
        let host = FakeHost::default();
        host.granted.store(true, Ordering::SeqCst);
        let gate = gate(host.clone(), 4);

        match gate.ensure_write_access("work").unwrap() {
            Admission::Granted(work) => assert_eq!(work, "work"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(host.prompts.load(Ordering::SeqCst), 0);
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn test_one_prompt_for_many_waiters() {
        let host = FakeHost::default();
        let gate = gate(host.clone(), 4);

        let first = gate.ensure_write_access("a").unwrap();
        let second = gate.ensure_write_access("b").unwrap();
        assert!(matches!(first.decision(), GateDecision::PendingUserDecision(_)));
        assert_eq!(host.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(gate.pending_count(), 2);

        let resolution = gate
            .on_request_permission_result(WRITE_STORAGE_REQ_CODE, &[PermissionStatus::Granted])
            .unwrap();
        assert_eq!(resolution.decision, GateDecision::Granted);
        let work: Vec<_> = resolution.requests.iter().map(|(_, w)| *w).collect();
        assert_eq!(work, vec!["a", "b"]);

        let tokens: Vec<_> = resolution.requests.iter().map(|(t, _)| *t).collect();
        match (first, second) {
            (Admission::Pending(a), Admission::Pending(b)) => assert_eq!(tokens, vec![a, b]),
            _ => panic!("expected both requests to be pending"),
        }
        assert_eq!(gate.pending_count(), 0);

        // A later request opens a fresh prompt
        gate.ensure_write_access("c").unwrap();
        assert_eq!(host.prompts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_any_denial_denies_all() {
        let gate = gate(FakeHost::default(), 4);
        gate.ensure_write_access("a").unwrap();

        let resolution = gate
            .on_request_permission_result(
                WRITE_STORAGE_REQ_CODE,
                &[PermissionStatus::Granted, PermissionStatus::Denied],
            )
            .unwrap();
        assert_eq!(resolution.decision, GateDecision::Denied);
        assert_eq!(resolution.requests.len(), 1);
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn test_dismissed_prompt_is_denial() {
        let gate = gate(FakeHost::default(), 4);
        gate.ensure_write_access("a").unwrap();

        let resolution = gate
            .on_request_permission_result(WRITE_STORAGE_REQ_CODE, &[])
            .unwrap();
        assert_eq!(resolution.decision, GateDecision::Denied);
    }

    #[test]
    fn test_stray_results_are_ignored() {
        let gate = gate(FakeHost::default(), 4);
        assert!(gate
            .on_request_permission_result(WRITE_STORAGE_REQ_CODE, &[PermissionStatus::Granted])
            .is_none());

        gate.ensure_write_access("a").unwrap();
        assert!(gate
            .on_request_permission_result(42, &[PermissionStatus::Granted])
            .is_none());
        assert_eq!(gate.pending_count(), 1);
    }

    #[test]
    fn test_queue_is_bounded() {
        let gate = gate(FakeHost::default(), 2);
        gate.ensure_write_access("a").unwrap();
        gate.ensure_write_access("b").unwrap();

        let err = gate.ensure_write_access("c").unwrap_err();
        assert_eq!(err, AppError::TooManyPending(2));
        assert_eq!(gate.pending_count(), 2);
    }

    #[test]
    fn test_responder_delivers_decision() {
        let (tx, rx) = async_channel::unbounded();
        let responder = PermissionResponder::new(tx);
        assert!(responder.respond(WRITE_STORAGE_REQ_CODE, vec![PermissionStatus::Granted]));

        let decision = rx.try_recv().unwrap();
        assert_eq!(decision.request_code, WRITE_STORAGE_REQ_CODE);

        drop(rx);
        assert!(!responder.respond(WRITE_STORAGE_REQ_CODE, vec![]));
    }
}
