//! Topic explorer — the submit flow shared by every front end.
//!
//! One query at a time: the user message and a loading placeholder are
//! appended, the knowledge request runs, then the placeholder is replaced by
//! id with either the markdown answer or [`ERROR_REPLY`]. A successful answer
//! also replaces the graph wholesale; a failure keeps the previous one.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::graph::GraphData;
use crate::knowledge::{ERROR_REPLY, KnowledgeService};
use crate::transcript::{ChatMessage, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreReason {
    /// Input was empty or whitespace-only.
    Empty,
    /// Another query is still in flight.
    Busy,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Nothing happened; the transcript is unchanged.
    Ignored(IgnoreReason),
    Answered { reply: ChatMessage, graph: GraphData },
    /// The placeholder now holds [`ERROR_REPLY`].
    Failed { reply: ChatMessage },
}

/// Point-in-time view for front ends.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub messages: Vec<ChatMessage>,
    pub graph: Option<GraphData>,
    pub busy: bool,
}

#[derive(Debug, Default)]
struct ExplorerState {
    transcript: Transcript,
    graph: Option<GraphData>,
}

pub struct Explorer {
    knowledge: KnowledgeService,
    radius: f64,
    state: Mutex<ExplorerState>,
    busy: AtomicBool,
}

/// Clears the busy flag when dropped, whatever path the submit took.
pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Explorer {
    pub fn new(knowledge: KnowledgeService, radius: f64, transcript_cap: Option<usize>) -> Self {
        Self {
            knowledge,
            radius,
            state: Mutex::new(ExplorerState {
                transcript: Transcript::with_cap(transcript_cap),
                graph: None,
            }),
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn provider_name(&self) -> &'static str {
        self.knowledge.provider_name()
    }

    pub(crate) fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    /// Run one query end to end.
    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        let query = input.trim();
        if query.is_empty() {
            return SubmitOutcome::Ignored(IgnoreReason::Empty);
        }
        let Some(_guard) = self.try_begin() else {
            warn!("query ignored: another query is in flight");
            return SubmitOutcome::Ignored(IgnoreReason::Busy);
        };

        let placeholder_id = {
            let mut state = self.state.lock().await;
            state.transcript.push_user(query);
            state.transcript.push_placeholder()
        };

        info!(%query, provider = self.provider_name(), "query submitted");

        match self.knowledge.generate(query).await {
            Ok(response) => {
                let graph = GraphData::radial(query, &response.related_concepts, self.radius);
                let mut state = self.state.lock().await;
                state.graph = Some(graph.clone());
                let reply = resolve_placeholder(&mut state.transcript, &placeholder_id, response.markdown);
                info!(concepts = graph.edges.len(), "query answered");
                SubmitOutcome::Answered { reply, graph }
            }
            Err(e) => {
                error!(%query, error = %e, "knowledge request failed");
                let mut state = self.state.lock().await;
                let reply = resolve_placeholder(&mut state.transcript, &placeholder_id, ERROR_REPLY.to_string());
                SubmitOutcome::Failed { reply }
            }
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        Snapshot {
            messages: state.transcript.to_vec(),
            graph: state.graph.clone(),
            busy: self.is_busy(),
        }
    }

    pub async fn graph(&self) -> Option<GraphData> {
        self.state.lock().await.graph.clone()
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.transcript.to_vec()
    }
}

fn resolve_placeholder(transcript: &mut Transcript, id: &str, content: String) -> ChatMessage {
    transcript.resolve(id, content.clone()).unwrap_or_else(|| {
        warn!(placeholder_id = %id, "placeholder no longer in transcript");
        ChatMessage::assistant(content)
    })
}
