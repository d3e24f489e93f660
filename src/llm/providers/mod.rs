//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory — called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod gemini;
pub mod openai_compatible;

use serde::Deserialize;
use tracing::error;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` from config and an optional API key.
///
/// `api_key` is sourced from the environment (never TOML) and is `None`
/// for keyless local models.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider)),
        "gemini" => {
            let g = &config.gemini;
            let p = gemini::GeminiProvider::new(
                g.api_base_url.clone(),
                g.model.clone(),
                g.temperature,
                g.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::Gemini(p))
        }
        "openai" | "openai-compatible" => {
            let oai = &config.openai;
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                oai.api_base_url.clone(),
                oai.model.clone(),
                oai.temperature,
                oai.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}

pub(crate) fn http_client(timeout_seconds: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))
}

// Error envelope shared by OpenAI- and Google-style APIs:
// `{ "error": { "message": "...", "code": ..., "status": "..." } }`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
}

/// Consume the response and return it if successful, or a structured error.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = error_message(status, &body);
    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Request(message))
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => {
            let code = match (env.error.status, env.error.code) {
                (Some(s), _) => format!(" [{s}]"),
                (None, Some(serde_json::Value::String(s))) => format!(" [code={s}]"),
                (None, Some(other)) => format!(" [code={other}]"),
                (None, None) => String::new(),
            };
            format!("HTTP {status}{code}: {}", env.error.message)
        }
        Err(_) => format!("HTTP {status}: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn llm_config(provider: &str) -> LlmConfig {
        let mut cfg = Config::test_default(std::path::Path::new("/tmp")).llm;
        cfg.provider = provider.to_string();
        cfg
    }

    #[test]
    fn builds_each_known_provider() {
        assert!(matches!(build(&llm_config("dummy"), None), Ok(LlmProvider::Dummy(_))));
        assert!(matches!(build(&llm_config("gemini"), None), Ok(LlmProvider::Gemini(_))));
        assert!(matches!(build(&llm_config("openai"), None), Ok(LlmProvider::OpenAiCompatible(_))));
        assert!(matches!(
            build(&llm_config("openai-compatible"), Some("k".into())),
            Ok(LlmProvider::OpenAiCompatible(_))
        ));
    }

    #[test]
    fn unknown_provider_errors() {
        let err = build(&llm_config("claude-on-a-toaster"), None).unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(ref p) if p == "claude-on-a-toaster"));
    }

    #[test]
    fn google_error_envelope_is_summarised() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        let msg = error_message(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(msg.contains("400"));
        assert!(msg.contains("[INVALID_ARGUMENT]"));
        assert!(msg.contains("API key not valid."));
    }

    #[test]
    fn openai_error_envelope_is_summarised() {
        let body = r#"{"error":{"message":"Rate limit reached","code":"rate_limit_exceeded"}}"#;
        let msg = error_message(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert!(msg.contains("[code=rate_limit_exceeded]"));
    }

    #[test]
    fn non_json_error_body_is_kept_verbatim() {
        let msg = error_message(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(msg, "HTTP 502 Bad Gateway: upstream down");
    }
}
