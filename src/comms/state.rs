//! Shared state for the comms layer — capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and are restricted to the typed
//! methods below. The [`Explorer`] itself is private; channels cannot touch
//! the transcript or graph except through a submit or a snapshot.
//!
//! # Intra-subsystem events
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! manager (shutdown, query outcome) without a return path of its own.
//! The manager owns the receiver end.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::AppError;
use crate::explorer::{Explorer, Snapshot, SubmitOutcome};
use crate::graph::GraphData;
use crate::graph::svg::{SvgArtifact, SvgOptions};

// ── Events ────────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped (clean exit or EOF).
    ChannelShutdown { channel_id: String },
    QueryAnswered { channel_id: String, concepts: usize },
    QueryFailed { channel_id: String },
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    explorer: Arc<Explorer>,
    artifact: SvgArtifact,
    /// Back-channel to the comms manager.
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(explorer: Arc<Explorer>, artifact: SvgArtifact, event_tx: mpsc::Sender<CommsEvent>) -> Self {
        Self { explorer, artifact, event_tx }
    }

    /// Submit `query` from `channel_id` and await the outcome.
    ///
    /// The submit runs on its own task so a caller that goes away mid-request
    /// (an HTTP client disconnecting, a timed-out handler) cannot leave a
    /// loading placeholder behind. The same task writes the graph to the
    /// configured SVG path after an answer and reports the outcome.
    pub async fn submit(&self, channel_id: &str, query: String) -> Result<SubmitOutcome, AppError> {
        let explorer = self.explorer.clone();
        let artifact = self.artifact.clone();
        let event_tx = self.event_tx.clone();
        let channel_id = channel_id.to_string();

        tokio::spawn(async move {
            let outcome = explorer.submit(&query).await;
            match &outcome {
                SubmitOutcome::Answered { graph, .. } => {
                    artifact.persist(graph).await;
                    send_event(&event_tx, CommsEvent::QueryAnswered { channel_id, concepts: graph.edges.len() });
                }
                SubmitOutcome::Failed { .. } => {
                    send_event(&event_tx, CommsEvent::QueryFailed { channel_id });
                }
                SubmitOutcome::Ignored(_) => {}
            }
            outcome
        })
        .await
        .map_err(|e| AppError::Comms(format!("submit task failed: {e}")))
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.explorer.snapshot().await
    }

    pub async fn graph(&self) -> Option<GraphData> {
        self.explorer.graph().await
    }

    pub fn is_busy(&self) -> bool {
        self.explorer.is_busy()
    }

    pub fn provider_name(&self) -> &'static str {
        self.explorer.provider_name()
    }

    pub fn svg_options(&self) -> &SvgOptions {
        &self.artifact.options
    }

    pub fn svg_path(&self) -> Option<&std::path::Path> {
        self.artifact.path.as_deref()
    }

    /// Report an event to the comms manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        send_event(&self.event_tx, event);
    }
}

fn send_event(tx: &mpsc::Sender<CommsEvent>, event: CommsEvent) {
    if let Err(e) = tx.try_send(event) {
        warn!("comms event dropped: {e}");
    }
}
