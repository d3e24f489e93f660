//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given with `-f`) relative to the
//! current working directory, then applies `NEXUS_WORK_DIR` and
//! `NEXUS_LOG_LEVEL` env overrides. The LLM API key comes from `LLM_API_KEY`
//! (falling back to `API_KEY`) and is never read from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub enabled: bool,
}

/// Axum HTTP channel configuration.
#[derive(Debug, Clone)]
pub struct AxumChannelConfig {
    pub enabled: bool,
    /// Socket address to bind the listener to.
    pub bind: String,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub axum_channel: AxumChannelConfig,
}

/// Gemini `generateContent` provider configuration (`[llm.gemini]`).
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API root, without the `/models/...` suffix.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// OpenAI / OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

/// LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider (`"gemini"`, `"openai"`, `"dummy"`).
    /// Maps to `default` in `[llm]`, other provider sections may coexist.
    pub provider: String,
    pub gemini: GeminiConfig,
    pub openai: OpenAiConfig,
}

impl LlmConfig {
    /// Model name of the active provider, for status output.
    pub fn active_model(&self) -> &str {
        match self.provider.as_str() {
            "gemini" => &self.gemini.model,
            "openai" | "openai-compatible" => &self.openai.model,
            _ => "none",
        }
    }
}

/// Knowledge request configuration (`[knowledge]`).
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    /// Optional file replacing the built-in system instruction.
    pub system_prompt_file: Option<PathBuf>,
}

/// Diagram layout and rendering configuration (`[graph]`).
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Distance of concept nodes from the core node.
    pub radius: f64,
    /// SVG canvas size.
    pub width: f64,
    pub height: f64,
    /// Where the latest diagram is written (already resolved against `work_dir`).
    /// `None` disables the file artifact.
    pub svg_output: Option<PathBuf>,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// Working directory for generated artifacts (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Optional log file; stderr when unset.
    pub log_file: Option<PathBuf>,
    pub comms: CommsConfig,
    pub llm: LlmConfig,
    /// API key from `LLM_API_KEY` / `API_KEY`. Never sourced from TOML.
    pub llm_api_key: Option<String>,
    pub knowledge: KnowledgeConfig,
    pub graph: GraphConfig,
    /// Maximum number of chat messages kept in the transcript.
    pub transcript_cap: Option<usize>,
}

impl Config {
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    pub fn comms_axum_should_load(&self) -> bool {
        self.comms.axum_channel.enabled
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    app: RawApp,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    knowledge: RawKnowledge,
    #[serde(default)]
    graph: RawGraph,
    #[serde(default)]
    transcript: RawTranscript,
}

#[derive(Deserialize)]
struct RawApp {
    name: String,
    work_dir: String,
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    axum_channel: RawAxumChannel,
}

#[derive(Deserialize)]
struct RawPty {
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize)]
struct RawAxumChannel {
    /// Defaults to `false`: the HTTP page must be explicitly enabled.
    #[serde(default = "default_false")]
    enabled: bool,
    #[serde(default = "default_http_bind")]
    bind: String,
}

impl Default for RawAxumChannel {
    fn default() -> Self {
        Self { enabled: false, bind: default_http_bind() }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    gemini: RawGeminiConfig,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            gemini: RawGeminiConfig::default(),
            openai: RawOpenAiConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawGeminiConfig {
    #[serde(default = "default_gemini_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_gemini_model")]
    model: String,
    #[serde(default = "default_gemini_temperature")]
    temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawGeminiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_gemini_api_base_url(),
            model: default_gemini_model(),
            temperature: default_gemini_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_gemini_temperature")]
    temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_gemini_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawKnowledge {
    #[serde(default)]
    system_prompt_file: Option<String>,
}

#[derive(Deserialize)]
struct RawGraph {
    #[serde(default = "default_radius")]
    radius: f64,
    #[serde(default = "default_width")]
    width: f64,
    #[serde(default = "default_height")]
    height: f64,
    /// Relative paths resolve against `work_dir`; `""` disables the artifact.
    #[serde(default = "default_svg_output")]
    svg_output: String,
}

impl Default for RawGraph {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            width: default_width(),
            height: default_height(),
            svg_output: default_svg_output(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawTranscript {
    cap: Option<usize>,
}

fn default_llm_provider() -> String { "gemini".to_string() }
fn default_gemini_api_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_gemini_model() -> String { "gemini-2.5-flash".to_string() }
fn default_gemini_temperature() -> f32 { 0.3 }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_timeout_seconds() -> u64 { 60 }
fn default_radius() -> f64 { crate::graph::DEFAULT_RADIUS }
fn default_width() -> f64 { 800.0 }
fn default_height() -> f64 { 600.0 }
fn default_svg_output() -> String { "graph.svg".to_string() }
fn default_http_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_true() -> bool { true }
fn default_false() -> bool { false }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `path` (default `config/default.toml`), then apply
/// env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("NEXUS_WORK_DIR").ok();
    let log_level_override = env::var("NEXUS_LOG_LEVEL").ok();
    let mut config = load_from(
        Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)),
        work_dir_override.as_deref(),
        log_level_override.as_deref(),
    )?;
    config.llm_api_key = api_key_from_env();
    Ok(config)
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    from_toml_str(&raw, work_dir_override, log_level_override)
        .map_err(|e| AppError::Config(format!("{} ({})", e, path.display())))
}

fn from_toml_str(
    raw: &str,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, String> {
    let parsed: RawConfig = toml::from_str(raw).map_err(|e| format!("parse error: {e}"))?;

    let a = parsed.app;
    let work_dir = expand_home(work_dir_override.unwrap_or(&a.work_dir));
    let log_level = log_level_override.unwrap_or(&a.log_level).to_string();

    if !(parsed.graph.radius.is_finite() && parsed.graph.radius > 0.0) {
        return Err(format!("graph.radius must be a positive number, got {}", parsed.graph.radius));
    }
    if parsed.graph.width <= 0.0 || parsed.graph.height <= 0.0 {
        return Err("graph.width and graph.height must be positive".to_string());
    }

    let svg_output = match parsed.graph.svg_output.trim() {
        "" => None,
        p => Some(resolve_against(&work_dir, p)),
    };

    Ok(Config {
        app_name: a.name,
        log_level,
        log_file: a.log_file.map(|p| resolve_against(&work_dir, &p)),
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
            axum_channel: AxumChannelConfig {
                enabled: parsed.comms.axum_channel.enabled,
                bind: parsed.comms.axum_channel.bind,
            },
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            gemini: GeminiConfig {
                api_base_url: parsed.llm.gemini.api_base_url,
                model: parsed.llm.gemini.model,
                temperature: parsed.llm.gemini.temperature,
                timeout_seconds: parsed.llm.gemini.timeout_seconds,
            },
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        llm_api_key: None,
        knowledge: KnowledgeConfig {
            system_prompt_file: parsed.knowledge.system_prompt_file.map(PathBuf::from),
        },
        graph: GraphConfig {
            radius: parsed.graph.radius,
            width: parsed.graph.width,
            height: parsed.graph.height,
            svg_output,
        },
        transcript_cap: parsed.transcript.cap,
        work_dir,
    })
}

fn api_key_from_env() -> Option<String> {
    ["LLM_API_KEY", "API_KEY"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|v| !v.trim().is_empty())
}

fn resolve_against(base: &Path, path: &str) -> PathBuf {
    let p = expand_home(path);
    if p.is_absolute() { p } else { base.join(p) }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for tests — dummy LLM, no API key, no artifact, no network.
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            app_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            log_file: None,
            comms: CommsConfig {
                pty: PtyConfig { enabled: false },
                axum_channel: AxumChannelConfig { enabled: false, bind: default_http_bind() },
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                gemini: GeminiConfig {
                    api_base_url: "http://127.0.0.1:1/v1beta".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
                openai: OpenAiConfig {
                    api_base_url: "http://127.0.0.1:1/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            llm_api_key: None,
            knowledge: KnowledgeConfig { system_prompt_file: None },
            graph: GraphConfig {
                radius: default_radius(),
                width: default_width(),
                height: default_height(),
                svg_output: None,
            },
            transcript_cap: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[app]
name = "nexus-test"
work_dir = "~/.nexus"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config_applies_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.app_name, "nexus-test");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.llm.gemini.model, "gemini-2.5-flash");
        assert!((cfg.llm.gemini.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(cfg.graph.radius, 180.0);
        assert!(cfg.comms.pty.enabled);
        assert!(!cfg.comms.axum_channel.enabled);
        assert_eq!(cfg.comms.axum_channel.bind, "127.0.0.1:8080");
        assert!(cfg.transcript_cap.is_none());
        assert!(cfg.llm_api_key.is_none());
    }

    #[test]
    fn svg_output_resolves_against_work_dir() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/nexus-work"), None).unwrap();
        assert_eq!(cfg.graph.svg_output, Some(PathBuf::from("/tmp/nexus-work/graph.svg")));
    }

    #[test]
    fn empty_svg_output_disables_artifact() {
        let toml = format!("{MINIMAL_TOML}\n[graph]\nsvg_output = \"\"\n");
        let f = write_toml(&toml);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert!(cfg.graph.svg_output.is_none());
    }

    #[test]
    fn provider_sections_parse() {
        let toml = format!(
            "{MINIMAL_TOML}\n[llm]\ndefault = \"openai\"\n\n[llm.openai]\nmodel = \"local-qwen\"\napi_base_url = \"http://127.0.0.1:8081/v1/chat/completions\"\n\n[transcript]\ncap = 50\n"
        );
        let f = write_toml(&toml);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.active_model(), "local-qwen");
        assert_eq!(cfg.transcript_cap, Some(50));
    }

    #[test]
    fn non_positive_radius_rejected() {
        let toml = format!("{MINIMAL_TOML}\n[graph]\nradius = 0.0\n");
        let f = write_toml(&toml);
        let msg = load_from(f.path(), None, None).unwrap_err().to_string();
        assert!(msg.contains("graph.radius"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.nexus");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".nexus"));
    }

    #[test]
    fn absolute_and_relative_paths_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn missing_file_errors() {
        let msg = load_from(Path::new("/nonexistent/config.toml"), None, None)
            .unwrap_err()
            .to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn missing_app_section_errors() {
        let f = write_toml("[llm]\ndefault = \"dummy\"\n");
        let msg = load_from(f.path(), None, None).unwrap_err().to_string();
        assert!(msg.contains("parse error"));
    }

    #[test]
    fn env_overrides_apply() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/test-override"), Some("debug")).unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/test-override"));
        assert_eq!(cfg.log_level, "debug");
    }
}
