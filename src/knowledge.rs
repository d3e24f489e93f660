//! Knowledge requests — the one structured round-trip to the hosted model.
//!
//! The model is asked for a JSON document with a markdown explanation and a
//! short list of related concepts that feed the radial diagram.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{CompletionRequest, LlmProvider, ProviderError};

/// Built-in system instruction sent with every knowledge request.
pub const SYSTEM_INSTRUCTION: &str = "You are Nexus, an advanced academic research assistant. \
Your goal is to explain complex topics clearly and identify the structural relationships between concepts. \
Always analyze the user query to build a knowledge graph structure.";

/// Fixed reply shown in place of an answer when a request fails.
pub const ERROR_REPLY: &str = "I encountered an error analyzing that topic. Please try again.";

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("no usable text in model response")]
    Empty,
    #[error("malformed knowledge response: {0}")]
    Malformed(String),
}

/// Structured reply requested from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeResponse {
    pub markdown: String,
    pub related_concepts: Vec<RelatedConcept>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedConcept {
    pub topic: String,
    pub description: String,
    pub connection_type: String,
}

/// JSON schema for [`KnowledgeResponse`], in lower-case JSON-schema form.
/// Providers translate it to their own dialect.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "markdown": {
                "type": "string",
                "description": "A comprehensive, markdown-formatted explanation of the topic. Use headers, lists, and bold text."
            },
            "relatedConcepts": {
                "type": "array",
                "description": "A list of 3 to 6 key concepts, entities, or sub-topics related to the query for visualization.",
                "items": {
                    "type": "object",
                    "properties": {
                        "topic": { "type": "string", "description": "The name of the concept (max 3 words)." },
                        "description": { "type": "string", "description": "A very brief 1-sentence definition." },
                        "connectionType": {
                            "type": "string",
                            "description": "How it connects to the main topic (e.g., 'Component of', 'Influenced by')."
                        }
                    },
                    "required": ["topic", "description", "connectionType"]
                }
            }
        },
        "required": ["markdown", "relatedConcepts"]
    })
}

/// Parse the model's text into a [`KnowledgeResponse`].
///
/// Accepts a bare JSON document or one wrapped in a markdown code fence.
pub fn parse_response(text: &str) -> Result<KnowledgeResponse, KnowledgeError> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(KnowledgeError::Empty);
    }
    serde_json::from_str(body).map_err(|e| KnowledgeError::Malformed(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_end();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the info string (`json`): up to the first newline, or up to the
    // body when the whole fence sits on one line.
    let body = match rest.split_once('\n') {
        Some((info, body)) if !info.trim_start().starts_with(['{', '[']) => body,
        Some(_) => rest,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    body.trim()
}

/// Issues knowledge requests against the configured provider.
#[derive(Debug, Clone)]
pub struct KnowledgeService {
    provider: LlmProvider,
    system_instruction: String,
    schema: Value,
}

impl KnowledgeService {
    pub fn new(provider: LlmProvider) -> Self {
        Self {
            provider,
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            schema: response_schema(),
        }
    }

    /// Replace the system instruction with the contents of `path`.
    /// A missing or empty file keeps the built-in instruction.
    pub fn with_system_prompt_file(mut self, path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => {
                debug!(path = %path.display(), "system instruction loaded from file");
                self.system_instruction = text.trim().to_string();
            }
            Ok(_) => warn!(path = %path.display(), "system prompt file is empty — using built-in instruction"),
            Err(e) => warn!(path = %path.display(), "cannot read system prompt file: {e} — using built-in instruction"),
        }
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// One structured round-trip. No retry.
    pub async fn generate(&self, prompt: &str) -> Result<KnowledgeResponse, KnowledgeError> {
        let request = CompletionRequest::new(prompt)
            .system(&self.system_instruction)
            .json_schema(&self.schema);

        let response = self.provider.complete(&request).await?;

        if let Some(u) = &response.usage {
            debug!(
                input_tokens = u.input_tokens,
                output_tokens = u.output_tokens,
                cached_tokens = u.cached_input_tokens,
                "llm usage"
            );
        }

        let parsed = parse_response(&response.text)?;
        debug!(concepts = parsed.related_concepts.len(), "knowledge response parsed");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::dummy::DummyProvider;

    const VALID: &str = r##"{
        "markdown": "# CRISPR\n\nGene editing.",
        "relatedConcepts": [
            { "topic": "Cas9", "description": "An enzyme.", "connectionType": "Component of" },
            { "topic": "Guide RNA", "description": "Targets DNA.", "connectionType": "Component of" },
            { "topic": "Bacteria", "description": "Origin organism.", "connectionType": "Derived from" }
        ]
    }"##;

    #[test]
    fn parses_valid_document() {
        let r = parse_response(VALID).unwrap();
        assert!(r.markdown.starts_with("# CRISPR"));
        assert_eq!(r.related_concepts.len(), 3);
        assert_eq!(r.related_concepts[2].connection_type, "Derived from");
    }

    #[test]
    fn parses_fenced_document() {
        let fenced = format!("```json\n{VALID}\n```");
        assert_eq!(parse_response(&fenced).unwrap(), parse_response(VALID).unwrap());
    }

    #[test]
    fn parses_single_line_fence() {
        let compact = r#"{"markdown":"m","relatedConcepts":[{"topic":"t","description":"d","connectionType":"c"}]}"#;
        for text in [format!("```{compact}```"), format!("```json {compact}```"), format!("```json\n{compact}```")] {
            let r = parse_response(&text).unwrap();
            assert_eq!(r.markdown, "m");
            assert_eq!(r.related_concepts.len(), 1);
        }
    }

    #[test]
    fn empty_text_is_empty_error() {
        assert!(matches!(parse_response("   "), Err(KnowledgeError::Empty)));
        assert!(matches!(parse_response("```json\n```"), Err(KnowledgeError::Empty)));
    }

    #[test]
    fn missing_field_is_malformed() {
        let err = parse_response(r#"{ "markdown": "only text" }"#).unwrap_err();
        assert!(matches!(err, KnowledgeError::Malformed(ref m) if m.contains("relatedConcepts")));
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(parse_response("[echo] hi"), Err(KnowledgeError::Malformed(_))));
    }

    #[test]
    fn schema_requires_both_fields() {
        let s = response_schema();
        assert_eq!(s["required"], json!(["markdown", "relatedConcepts"]));
        assert_eq!(s["properties"]["relatedConcepts"]["type"], "array");
        assert_eq!(
            s["properties"]["relatedConcepts"]["items"]["required"],
            json!(["topic", "description", "connectionType"])
        );
    }

    #[test]
    fn response_serialises_camel_case() {
        let v = serde_json::to_value(parse_response(VALID).unwrap()).unwrap();
        assert!(v.get("relatedConcepts").is_some());
        assert!(v["relatedConcepts"][0].get("connectionType").is_some());
    }

    #[tokio::test]
    async fn generate_with_dummy_provider() {
        let svc = KnowledgeService::new(LlmProvider::Dummy(DummyProvider));
        let r = svc.generate("Neural Networks").await.unwrap();
        assert!(r.markdown.contains("Neural Networks"));
        assert_eq!(r.related_concepts.len(), 4);
    }

    #[test]
    fn missing_prompt_file_keeps_builtin_instruction() {
        let svc = KnowledgeService::new(LlmProvider::Dummy(DummyProvider))
            .with_system_prompt_file(Path::new("/nonexistent/system.txt"));
        assert_eq!(svc.system_instruction(), SYSTEM_INSTRUCTION);
    }

    #[test]
    fn prompt_file_overrides_instruction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.txt");
        std::fs::write(&path, "Be brief.\n").unwrap();
        let svc = KnowledgeService::new(LlmProvider::Dummy(DummyProvider)).with_system_prompt_file(&path);
        assert_eq!(svc.system_instruction(), "Be brief.");
    }
}
