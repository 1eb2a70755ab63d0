//! Single-flight gate between a QR decoder and the attendance backend.
//!
//! A decoder reports the same code many times per second while it stays in
//! view. The gate accepts one decode, submits it, shows the outcome for a
//! cooldown window and then re-arms itself.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::submit::Submitter;
use crate::types::{now_rfc3339, ScanHistoryEntry, ScanOutcome, ScanReply, ScanStatus};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(2000);
pub const DEFAULT_HISTORY_CAP: usize = 10;

const UNKNOWN: &str = "Unknown";
const NO_NIS: &str = "N/A";
const ERROR_LABEL: &str = "Error";
// Emitted by browser decoders for every frame without a code in it.
const MISS_NOT_FOUND: &str = "NotFoundException";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// How long `Success`/`Error` stay visible before the gate re-arms.
    pub cooldown: Duration,
    /// Number of recent scans kept, newest first.
    pub history_cap: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

/// What happened to one call of [`ScanGate::submit_decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "entry", rename_all = "snake_case")]
pub enum DecodeOutcome {
    /// The gate was busy (or the payload was empty); nothing was submitted.
    Ignored,
    /// The submission resolved and produced this history entry.
    Completed(ScanHistoryEntry),
    /// An external reset dropped the submission before it resolved.
    Abandoned,
}

/// Read-only view of the gate for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct GateSnapshot {
    pub status: ScanStatus,
    pub label: &'static str,
    pub last_payload: Option<String>,
    pub camera_active: bool,
    pub history: Vec<ScanHistoryEntry>,
}

#[derive(Debug)]
struct ScanAttempt {
    payload: String,
    submitted_at: Instant,
}

#[derive(Debug, Default)]
struct GateState {
    status: ScanStatus,
    engaged: bool,
    camera_active: bool,
    last_payload: Option<String>,
    history: VecDeque<ScanHistoryEntry>,
    // Bumped by every external reset; stale results and timers compare against it.
    epoch: u64,
    next_id: u64,
    in_flight: Option<CancellationToken>,
    cooldown: Option<CancellationToken>,
}

/// Owns scan status, the single-flight guard, the cooldown timer and the
/// recent-scans history. Cheap to clone; clones share the same gate.
#[derive(Clone, Debug)]
pub struct ScanGate {
    inner: Arc<Mutex<GateState>>,
    status_tx: Arc<watch::Sender<ScanStatus>>,
    submitter: Arc<dyn Submitter>,
    config: GateConfig,
}

impl ScanGate {
    pub fn new(submitter: Arc<dyn Submitter>, config: GateConfig) -> Self {
        let (status_tx, _) = watch::channel(ScanStatus::Ready);
        let config = GateConfig {
            history_cap: config.history_cap.max(1),
            ..config
        };
        Self {
            inner: Arc::new(Mutex::new(GateState::default())),
            status_tx: Arc::new(status_tx),
            submitter,
            config,
        }
    }

    pub fn config(&self) -> GateConfig {
        self.config
    }

    /// Feed one decoded payload into the gate.
    ///
    /// - Only a decode arriving while the gate is `Ready` is submitted; the
    ///   guard is engaged under the lock before the submission starts.
    /// - Every other decode returns `Ignored` without touching state.
    /// - Resolves once the submission finishes (or is abandoned by a reset).
    ///   Dropping the returned future does not cancel the submission; the
    ///   gate still records its outcome and runs the cooldown.
    pub async fn submit_decode(&self, payload: impl Into<String>) -> DecodeOutcome {
        let payload = payload.into();
        if payload.is_empty() {
            debug!("empty decode ignored");
            return DecodeOutcome::Ignored;
        }

        let (attempt, epoch, abort) = {
            let mut state = self.inner.lock().await;
            if state.engaged {
                debug!(payload = %payload, status = %state.status, "decode ignored, gate busy");
                return DecodeOutcome::Ignored;
            }
            state.engaged = true;
            state.last_payload = Some(payload.clone());
            let abort = CancellationToken::new();
            state.in_flight = Some(abort.clone());
            transition(&mut state, &self.status_tx, ScanStatus::Scanning);
            let attempt = ScanAttempt {
                payload,
                submitted_at: Instant::now(),
            };
            (attempt, state.epoch, abort)
        };
        info!(payload = %attempt.payload, "submitting scan");

        // The attempt runs on its own task so that a caller giving up (a
        // dropped HTTP handler, a timeout) cannot leave the guard engaged.
        let gate = self.clone();
        let task = tokio::spawn(async move { gate.run_attempt(attempt, epoch, abort).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "scan task failed");
                let mut state = self.inner.lock().await;
                if state.epoch == epoch {
                    reset_locked(&mut state, &self.status_tx);
                }
                DecodeOutcome::Abandoned
            }
        }
    }

    async fn run_attempt(
        &self,
        attempt: ScanAttempt,
        epoch: u64,
        abort: CancellationToken,
    ) -> DecodeOutcome {
        let result = tokio::select! {
            res = self.submitter.submit(&attempt.payload) => res,
            _ = abort.cancelled() => {
                info!(payload = %attempt.payload, "scan abandoned by reset");
                return DecodeOutcome::Abandoned;
            }
        };
        let elapsed_ms = u64::try_from(attempt.submitted_at.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut state = self.inner.lock().await;
        if state.epoch != epoch {
            // A reset won the race against the response.
            return DecodeOutcome::Abandoned;
        }
        state.in_flight = None;
        state.next_id += 1;
        let id = state.next_id;

        let entry = match result {
            Ok(reply) => {
                info!(payload = %attempt.payload, elapsed_ms, "scan recorded");
                transition(&mut state, &self.status_tx, ScanStatus::Success);
                success_entry(id, attempt.payload, reply)
            }
            Err(e) => {
                warn!(payload = %attempt.payload, elapsed_ms, error = %e, "scan submission failed");
                transition(&mut state, &self.status_tx, ScanStatus::Error);
                error_entry(id, attempt.payload)
            }
        };

        state.history.push_front(entry.clone());
        state.history.truncate(self.config.history_cap);
        self.schedule_cooldown(&mut state);

        DecodeOutcome::Completed(entry)
    }

    /// A frame in which the decoder found nothing usable. Never changes state.
    pub fn decode_miss(&self, reason: &str) {
        if reason.is_empty() || reason.contains(MISS_NOT_FOUND) {
            return;
        }
        debug!(reason, "decoder miss");
    }

    /// Flip the camera flag. Switching it off resets the gate so the next
    /// activation starts from `Ready`. Returns the new flag.
    pub async fn toggle_camera(&self) -> bool {
        let mut state = self.inner.lock().await;
        state.camera_active = !state.camera_active;
        if !state.camera_active {
            reset_locked(&mut state, &self.status_tx);
        }
        info!(camera_active = state.camera_active, "camera toggled");
        state.camera_active
    }

    /// Force `Ready` now: release the guard, cancel a pending cooldown and
    /// drop an in-flight submission.
    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        reset_locked(&mut state, &self.status_tx);
        debug!("gate reset");
    }

    pub fn status(&self) -> ScanStatus {
        *self.status_tx.borrow()
    }

    /// Stream of status transitions.
    pub fn subscribe(&self) -> watch::Receiver<ScanStatus> {
        self.status_tx.subscribe()
    }

    pub async fn history(&self) -> Vec<ScanHistoryEntry> {
        let state = self.inner.lock().await;
        state.history.iter().cloned().collect()
    }

    pub async fn snapshot(&self) -> GateSnapshot {
        let state = self.inner.lock().await;
        GateSnapshot {
            status: state.status,
            label: state.status.label(),
            last_payload: state.last_payload.clone(),
            camera_active: state.camera_active,
            history: state.history.iter().cloned().collect(),
        }
    }

    fn schedule_cooldown(&self, state: &mut GateState) {
        let token = CancellationToken::new();
        if let Some(old) = state.cooldown.replace(token.clone()) {
            old.cancel();
        }
        let epoch = state.epoch;
        let inner = Arc::clone(&self.inner);
        let status_tx = Arc::clone(&self.status_tx);
        let cooldown = self.config.cooldown;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = time::sleep(cooldown) => {
                    let mut state = inner.lock().await;
                    // Cancellation happens under the same lock, so this check is final.
                    if state.epoch == epoch && !token.is_cancelled() {
                        state.cooldown = None;
                        state.engaged = false;
                        transition(&mut state, &status_tx, ScanStatus::Ready);
                    }
                }
            }
        });
    }
}

fn transition(state: &mut GateState, tx: &watch::Sender<ScanStatus>, next: ScanStatus) {
    state.status = next;
    tx.send_replace(next);
}

fn reset_locked(state: &mut GateState, tx: &watch::Sender<ScanStatus>) {
    state.epoch += 1;
    if let Some(t) = state.cooldown.take() {
        t.cancel();
    }
    if let Some(t) = state.in_flight.take() {
        t.cancel();
    }
    state.engaged = false;
    transition(state, tx, ScanStatus::Ready);
}

fn or_placeholder(value: Option<String>, placeholder: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| placeholder.to_string())
}

fn success_entry(id: u64, payload: String, reply: ScanReply) -> ScanHistoryEntry {
    ScanHistoryEntry {
        id,
        payload,
        display_name: or_placeholder(reply.name, UNKNOWN),
        class_name: or_placeholder(reply.class, UNKNOWN),
        nis: Some(or_placeholder(reply.nis, NO_NIS)),
        timestamp: now_rfc3339(),
        outcome: ScanOutcome::Success,
    }
}

fn error_entry(id: u64, payload: String) -> ScanHistoryEntry {
    ScanHistoryEntry {
        id,
        payload,
        display_name: ERROR_LABEL.to_string(),
        class_name: ERROR_LABEL.to_string(),
        nis: None,
        timestamp: now_rfc3339(),
        outcome: ScanOutcome::Error,
    }
}
