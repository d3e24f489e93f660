//! PTY (console) comms channel — reads topics from stdin, prints the
//! explanation and the related concepts to stdout.
//!
//! Implements [`Component`] so the comms manager can spawn it as an
//! independent task. All explorer access goes through [`CommsState`].
//!
//! Runs until the `shutdown` token is cancelled (Ctrl-C), stdin is closed,
//! or the user types `/quit`.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::explorer::{IgnoreReason, SubmitOutcome};
use crate::graph::{CORE_NODE_ID, GraphData};
use crate::runtime::{Component, ComponentFuture};

use super::state::{CommsEvent, CommsState};

const HELP: &str = "\
Type a topic and press Enter to explore it.
  /graph   show the current knowledge graph
  /help    show this help
  /quit    leave the console
Try: Quantum Entanglement, The Fall of Rome, CRISPR CAS-9, Neural Networks";

// ── PtyChannel ───────────────────────────────────────────────────────────────

pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), state }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_pty(self.channel_id, self.state, shutdown))
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Help,
    Graph,
    Quit,
    Unknown(&'a str),
    Query(&'a str),
}

fn parse_line(line: &str) -> Command<'_> {
    match line.trim() {
        "/help" | "/?" => Command::Help,
        "/graph" => Command::Graph,
        "/quit" | "/exit" => Command::Quit,
        cmd if cmd.starts_with('/') => Command::Unknown(cmd),
        query => Command::Query(query),
    }
}

// ── Rendering ────────────────────────────────────────────────────────────────

/// Plain-text listing of the concepts around the core node.
pub(crate) fn describe_graph(graph: &GraphData) -> String {
    let mut out = String::new();
    let Some(core) = graph.core() else {
        return "(no graph yet)".to_string();
    };
    let _ = writeln!(out, "◉ {}", core.label);
    for edge in graph.edges.iter().filter(|e| e.source == CORE_NODE_ID) {
        let Some(node) = graph.node(&edge.target) else { continue };
        match &edge.relation {
            Some(rel) => {
                let _ = writeln!(out, "  ├─ {} ({rel}): {}", node.label, node.description);
            }
            None => {
                let _ = writeln!(out, "  ├─ {}: {}", node.label, node.description);
            }
        }
    }
    out.trim_end().to_string()
}

// ── run_pty ──────────────────────────────────────────────────────────────────

async fn run_pty(channel_id: String, state: Arc<CommsState>, shutdown: CancellationToken) -> Result<(), AppError> {
    info!(%channel_id, "pty channel started — type a topic and press Enter. Ctrl-C to quit.");
    println!("─────────────────────────────────");
    println!(" Nexus console  (/help, Ctrl-C to quit)");
    println!("─────────────────────────────────");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!("\n[pty] shutdown signal received — closing console channel");
                info!("pty channel shutting down");
                break;
            }

            line = lines.next_line() => {
                let input = match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => input,
                };

                match parse_line(&input) {
                    Command::Query("") => continue,
                    Command::Help => println!("{HELP}"),
                    Command::Quit => break,
                    Command::Unknown(cmd) => println!("unknown command {cmd}; type /help"),
                    Command::Graph => match state.graph().await {
                        Some(graph) => println!("{}", describe_graph(&graph)),
                        None => println!("(no graph yet)"),
                    },
                    Command::Query(query) => {
                        debug!(%query, "pty received query");
                        println!("… analyzing");
                        match state.submit(&channel_id, query.to_string()).await {
                            Err(e) => {
                                warn!("submit error: {e}, pty exiting");
                                break;
                            }
                            Ok(outcome) => print_outcome(&state, &outcome),
                        }
                    }
                }
            }
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

fn print_outcome(state: &CommsState, outcome: &SubmitOutcome) {
    match outcome {
        SubmitOutcome::Answered { reply, graph } => {
            println!("\n{}\n", reply.content.trim());
            println!("{}", describe_graph(graph));
            if let Some(path) = state.svg_path() {
                println!("\n[graph] {}", path.display());
            }
        }
        SubmitOutcome::Failed { reply } => println!("{}", reply.content),
        SubmitOutcome::Ignored(IgnoreReason::Busy) => println!("[busy] a query is already running"),
        SubmitOutcome::Ignored(IgnoreReason::Empty) => {}
    }
}
