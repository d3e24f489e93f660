//! End-to-end explorer tests against a local fake Gemini endpoint.

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use nexus::config::LlmConfig;
use nexus::config::Config;
use nexus::explorer::{Explorer, SubmitOutcome};
use nexus::graph::{CORE_NODE_ID, NodeKind};
use nexus::knowledge::{ERROR_REPLY, KnowledgeService};
use nexus::llm::providers;

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

fn answer_body() -> Value {
    let document = json!({
        "markdown": "## Quantum Entanglement\n\nCorrelated particles.",
        "relatedConcepts": [
            { "topic": "Superposition", "description": "States at once.", "connectionType": "Component of" },
            { "topic": "Bell Test", "description": "Experimental check.", "connectionType": "Tested by" },
            { "topic": "Quantum Cryptography", "description": "Secure keys.", "connectionType": "Applied in" }
        ]
    });
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": document.to_string() }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 42, "candidatesTokenCount": 120 }
    })
}

async fn generate(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    seen.requests.lock().unwrap().push((headers, body));
    (StatusCode::OK, Json(answer_body())).into_response()
}

async fn overloaded() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": { "code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE" } })),
    )
        .into_response()
}

/// Serve `router` on an ephemeral port and return its `/v1beta` base URL.
async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1beta")
}

fn gemini_config(base_url: String) -> LlmConfig {
    let dir = std::env::temp_dir();
    let mut llm = Config::test_default(&dir).llm;
    llm.provider = "gemini".into();
    llm.gemini.api_base_url = base_url;
    llm.gemini.model = "gemini-2.5-flash".into();
    llm.gemini.timeout_seconds = 5;
    llm
}

fn explorer_for(llm: &LlmConfig) -> Explorer {
    let provider = providers::build(llm, Some("test-key".into())).unwrap();
    Explorer::new(KnowledgeService::new(provider), 180.0, None)
}

#[tokio::test]
async fn answered_query_builds_radial_graph() {
    let seen = Seen::default();
    let router = Router::new()
        .route("/v1beta/models/{*action}", post(generate))
        .with_state(seen.clone());
    let base = serve(router).await;
    let explorer = explorer_for(&gemini_config(base));

    let SubmitOutcome::Answered { reply, graph } = explorer.submit("Quantum Entanglement").await else {
        panic!("expected an answer");
    };
    assert!(reply.content.starts_with("## Quantum Entanglement"));
    assert_eq!(graph.nodes.len(), 4);
    assert_eq!(graph.edges.len(), 3);
    assert_eq!(graph.core().unwrap().label, "Quantum Entanglement");
    assert!(graph.nodes.iter().skip(1).all(|n| n.kind == NodeKind::Concept));
    assert!(graph.edges.iter().all(|e| e.source == CORE_NODE_ID));
    assert_eq!(graph.edges[1].relation.as_deref(), Some("Tested by"));
    graph.validate().unwrap();

    let requests = seen.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];
    assert_eq!(headers["x-goog-api-key"], "test-key");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "Quantum Entanglement");
    assert!(body["systemInstruction"]["parts"][0]["text"].as_str().unwrap().contains("Nexus"));
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
}

#[tokio::test]
async fn provider_error_resolves_placeholder_with_error_reply() {
    let router = Router::new().route("/v1beta/models/{*action}", post(overloaded));
    let base = serve(router).await;
    let explorer = explorer_for(&gemini_config(base));

    let SubmitOutcome::Failed { reply } = explorer.submit("The Fall of Rome").await else {
        panic!("expected a failure");
    };
    assert_eq!(reply.content, ERROR_REPLY);

    let snapshot = explorer.snapshot().await;
    assert_eq!(snapshot.messages.len(), 2);
    assert!(snapshot.messages.iter().all(|m| !m.is_loading));
    assert!(snapshot.graph.is_none());
    assert!(!snapshot.busy);
}

#[tokio::test]
async fn concurrent_second_submit_is_ignored() {
    let seen = Seen::default();
    let router = Router::new()
        .route("/v1beta/models/{*action}", post(generate))
        .with_state(seen.clone());
    let base = serve(router).await;
    let explorer = Arc::new(explorer_for(&gemini_config(base)));

    let (a, b) = tokio::join!(explorer.submit("First"), explorer.submit("Second"));
    let answered = [&a, &b].iter().filter(|o| matches!(o, SubmitOutcome::Answered { .. })).count();
    let ignored = [&a, &b].iter().filter(|o| matches!(o, SubmitOutcome::Ignored(_))).count();
    assert_eq!((answered, ignored), (1, 1));
    assert_eq!(explorer.messages().await.len(), 2);
    assert_eq!(seen.requests.lock().unwrap().len(), 1);
}
