//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Covers OpenAI itself and compatible local servers (Ollama, LM Studio,
//! llama.cpp). Structured output is requested with
//! `response_format = { type: "json_schema", ... }`. All wire types are
//! private to this module.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, trace};

use crate::llm::{CompletionRequest, LlmResponse, LlmUsage, ProviderError};

use super::{check_status, http_client};

const SCHEMA_NAME: &str = "knowledge_response";

/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// `api_key` is `None` for keyless local models. When present it is sent
    /// as `Authorization: Bearer <key>` on every request.
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = http_client(timeout_seconds)?;
        Ok(Self { client, api_base_url, model, temperature, api_key })
    }

    pub async fn complete(&self, request: &CompletionRequest<'_>) -> Result<LlmResponse, ProviderError> {
        let payload = build_request(request, &self.model, self.temperature);

        debug!(
            model = %payload.model,
            temperature = ?payload.temperature,
            structured = payload.response_format.is_some(),
            content_len = request.prompt.len(),
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        let response = check_status(response).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received LLM response");
        into_llm_response(parsed)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    schema: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    prompt_tokens: u64,
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request(request: &CompletionRequest<'_>, model: &str, temperature: f32) -> ChatCompletionRequest {
    // gpt-5 family models reject the temperature parameter.
    let temperature = if model.starts_with("gpt-5") { None } else { Some(temperature) };

    let mut messages = Vec::with_capacity(2);
    if let Some(sys) = request.system {
        messages.push(Message { role: "system", content: sys.to_string() });
    }
    messages.push(Message { role: "user", content: request.prompt.to_string() });

    ChatCompletionRequest {
        model: model.to_string(),
        messages,
        temperature,
        response_format: request.response_schema.map(|schema| ResponseFormat {
            kind: "json_schema",
            json_schema: JsonSchemaFormat { name: SCHEMA_NAME, schema: schema.clone() },
        }),
    }
}

fn into_llm_response(parsed: ChatCompletionResponse) -> Result<LlmResponse, ProviderError> {
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::Request("empty or missing content in response".into()))?;

    let usage = parsed.usage.map(|u| LlmUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
        cached_input_tokens: u.prompt_tokens_details.map(|d| d.cached_tokens).unwrap_or(0),
    });

    Ok(LlmResponse { text, usage })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_request_body_shape() {
        let schema = json!({ "type": "object", "required": ["markdown"] });
        let req = CompletionRequest::new("The Fall of Rome").system("sys").json_schema(&schema);
        let body = serde_json::to_value(build_request(&req, "gpt-4o-mini", 0.3)).unwrap();

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "The Fall of Rome");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], SCHEMA_NAME);
        assert_eq!(body["response_format"]["json_schema"]["schema"]["type"], "object");
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn gpt5_omits_temperature() {
        let body = serde_json::to_value(build_request(&CompletionRequest::new("x"), "gpt-5-mini", 0.3)).unwrap();
        assert!(body.get("temperature").is_none());
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn response_content_and_usage_extracted() {
        let raw = json!({
            "choices": [{ "message": { "role": "assistant", "content": "  {\"markdown\":\"m\"}\n" } }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 7, "prompt_tokens_details": { "cached_tokens": 2 } }
        });
        let parsed: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        let resp = into_llm_response(parsed).unwrap();
        assert_eq!(resp.text, "{\"markdown\":\"m\"}");
        assert_eq!(
            resp.usage,
            Some(LlmUsage { input_tokens: 5, output_tokens: 7, cached_input_tokens: 2 })
        );
    }

    #[test]
    fn null_content_is_an_error() {
        let raw = json!({ "choices": [{ "message": { "content": null } }] });
        let parsed: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        assert!(into_llm_response(parsed).is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_request_error() {
        let p = OpenAiCompatibleProvider::new(
            "http://127.0.0.1:1/v1/chat/completions".into(),
            "test-model".into(),
            0.0,
            1,
            None,
        )
        .unwrap();
        let err = p.complete(&CompletionRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)));
    }
}
