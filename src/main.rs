//! Nexus — topic explorer entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config, apply CLI overrides
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build the LLM provider and knowledge service
//!   6. One-shot `--query`: answer, write the graph, exit
//!   7. Otherwise spawn Ctrl-C → shutdown watcher and run the comms channels
//!      until shutdown

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nexus::comms;
use nexus::config::{self, Config};
use nexus::error::AppError;
use nexus::explorer::{Explorer, IgnoreReason, SubmitOutcome};
use nexus::graph::CORE_NODE_ID;
use nexus::graph::svg::SvgArtifact;
use nexus::knowledge::KnowledgeService;
use nexus::llm::providers;
use nexus::logger;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;

    // The console only runs with -i, and never alongside a one-shot query.
    if !args.interactive || args.query.is_some() {
        config.comms.pty.enabled = false;
    }
    if args.query.is_some() {
        config.comms.axum_channel.enabled = false;
    }
    if let Some(svg) = args.svg_path.as_deref() {
        config.graph.svg_output = (!svg.is_empty()).then(|| PathBuf::from(svg));
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level, config.log_file.as_deref())?;

    info!(
        app_name = %config.app_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        interactive = %args.interactive,
        "config loaded"
    );

    if config.llm.provider != "dummy" && config.llm_api_key.is_none() {
        warn!(provider = %config.llm.provider, "no API key in LLM_API_KEY or API_KEY — requests will be rejected");
    }

    let provider = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Llm(e.to_string()))?;
    let mut knowledge = KnowledgeService::new(provider);
    if let Some(path) = &config.knowledge.system_prompt_file {
        knowledge = knowledge.with_system_prompt_file(path);
    }
    let explorer = Arc::new(Explorer::new(knowledge, config.graph.radius, config.transcript_cap));

    if let Some(query) = args.query.as_deref() {
        return run_query(&config, &explorer, query).await;
    }

    // Shared shutdown token — Ctrl-C cancels it, all channels watch it.
    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    print_startup_summary(&config, args.interactive);

    let comms = comms::start(&config, explorer, shutdown.clone());
    comms.join().await?;

    // If comms exited due to EOF (not Ctrl-C), still signal everything to stop.
    shutdown.cancel();

    if args.interactive {
        use std::io::Write as _;
        println!("\nBye :) ...");
        let _ = std::io::stdout().flush();
    }

    Ok(())
}

/// Answer a single query on stdout and write the graph artifact.
async fn run_query(config: &Config, explorer: &Explorer, query: &str) -> Result<(), AppError> {
    match explorer.submit(query).await {
        SubmitOutcome::Answered { reply, graph } => {
            println!("{}", reply.content.trim());
            let concepts: Vec<_> = graph.neighbors(CORE_NODE_ID).collect();
            if !concepts.is_empty() {
                println!("\nRelated concepts:");
                for node in concepts {
                    println!("  - {}: {}", node.label, node.description);
                }
            }
            if let Some(path) = SvgArtifact::from_config(&config.graph).persist(&graph).await {
                eprintln!("graph written to {}", path.display());
            }
            Ok(())
        }
        SubmitOutcome::Failed { reply } => Err(AppError::Query(reply.content)),
        SubmitOutcome::Ignored(IgnoreReason::Empty) => Err(AppError::Query("query must not be empty".into())),
        SubmitOutcome::Ignored(IgnoreReason::Busy) => Err(AppError::Query("another query is in flight".into())),
    }
}

fn print_startup_summary(config: &Config, interactive: bool) {
    let pid = std::process::id();
    let mode_text = if interactive { "interactive" } else { "daemon" };

    let fit = |text: String| -> String {
        const WIDTH: usize = 58;
        let char_count = text.chars().count();
        if char_count >= WIDTH {
            let mut out = text.chars().take(WIDTH - 1).collect::<String>();
            out.push('…');
            out
        } else {
            format!("{text:<WIDTH$}")
        }
    };

    let llm_line = format!(
        "provider={} model={}",
        config.llm.provider,
        config.llm.active_model()
    );

    let mut comms_lines = Vec::new();

    #[cfg(feature = "channel-pty")]
    comms_lines.push(format!(
        "⌨️  pty: {}",
        if config.comms.pty.enabled { "enabled" } else { "disabled" }
    ));

    if config.comms.axum_channel.enabled {
        #[cfg(feature = "channel-axum")]
        comms_lines.push(format!("🧩 http: http://{}/", config.comms.axum_channel.bind));
        #[cfg(not(feature = "channel-axum"))]
        comms_lines.push("🧩 http: configured but not compiled in".to_string());
    } else {
        comms_lines.push("🧩 http: disabled".to_string());
    }

    let graph_line = match &config.graph.svg_output {
        Some(path) => format!("radius={} svg={}", config.graph.radius, path.display()),
        None => format!("radius={} svg=off", config.graph.radius),
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ 🔭 Nexus Explorer                                            ║");
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🧾 App: {:<52}║", config.app_name);
    println!("║ 🧠 PID: {:<52}║", pid);
    println!("║ 🛰️  Mode: {:<51}║", mode_text);
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 📡 Comms                                                     ║");
    for line in comms_lines {
        println!("║   {}║", fit(line));
    }
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🧠 LLM                                                       ║");
    println!("║   {}║", fit(llm_line));
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🕸️  Graph                                                     ║");
    println!("║   {}║", fit(graph_line));
    println!("╚══════════════════════════════════════════════════════════════╝");

    if interactive {
        println!("💡 Type /help for help");
    }
}

// Hand-rolled parsing keeps the binary lean; the flag set is small.
struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    config_path: Option<String>,
    query: Option<String>,
    svg_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;
    let mut query = None;
    let mut svg_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: nexus [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Run in interactive mode (enables PTY console)");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -q, --query <TOPIC>        Answer one topic on stdout and exit");
                println!("      --svg <PATH>           Write the graph SVG here (\"\" disables it)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-f" | "--config" => config_path = Some(required_value(&arg, iter.next())),
            "-q" | "--query" => query = Some(required_value(&arg, iter.next())),
            "--svg" => svg_path = Some(required_value(&arg, iter.next())),
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // Each -v raises verbosity one tier from the config default:
    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (request flow, token usage)
    //   -vvvv+  → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, interactive, config_path, query, svg_path }
}

fn required_value(flag: &str, value: Option<String>) -> String {
    match value {
        Some(v) => v,
        None => {
            eprintln!("error: {flag} requires an argument");
            std::process::exit(1);
        }
    }
}
