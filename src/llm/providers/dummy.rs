//! Dummy LLM provider — no network.
//!
//! Plain requests are echoed back prefixed with `[echo]`. Structured requests
//! get a deterministic knowledge document built from the prompt, so the whole
//! query → graph path can run offline.

use serde_json::json;

use crate::llm::{CompletionRequest, LlmResponse, ProviderError};

const FACETS: [(&str, &str, &str); 4] = [
    ("Origins", "Where the idea of {} first came from.", "Influenced by"),
    ("Core Principles", "The central mechanisms that make {} work.", "Component of"),
    ("Applications", "Practical uses of {} today.", "Applied in"),
    ("Open Problems", "Questions about {} that remain unresolved.", "Challenged by"),
];

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, request: &CompletionRequest<'_>) -> Result<LlmResponse, ProviderError> {
        let text = match request.response_schema {
            Some(_) => knowledge_document(request.prompt),
            None => format!("[echo] {}", request.prompt),
        };
        Ok(LlmResponse { text, usage: None })
    }
}

fn knowledge_document(prompt: &str) -> String {
    let topic = prompt.trim();
    let concepts: Vec<_> = FACETS
        .iter()
        .map(|(name, description, connection)| {
            json!({
                "topic": name,
                "description": description.replace("{}", topic),
                "connectionType": connection,
            })
        })
        .collect();
    json!({
        "markdown": format!("## {topic}\n\n[echo] {topic}\n\n- **Origins**\n- **Core Principles**\n- **Applications**\n- **Open Problems**\n"),
        "relatedConcepts": concepts,
    })
    .to_string()
}
