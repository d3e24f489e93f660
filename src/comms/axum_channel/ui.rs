//! UI route handlers for the axum channel.
//!
//! The page is rendered on the server: transcript on the left, the current
//! graph inlined as SVG on the right. While a query is in flight the page
//! refreshes itself so the placeholder resolves without client script.

use std::fmt::Write as _;

use axum::{
    Form,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};
use serde::Deserialize;
use tracing::warn;

use crate::explorer::Snapshot;
use crate::graph::svg::{SvgOptions, escape_xml, render_svg};
use crate::transcript::{ChatMessage, Role};

use super::AxumState;

/// Starter topics offered on an empty transcript.
pub(crate) const SUGGESTIONS: [&str; 4] = ["Quantum Entanglement", "The Fall of Rome", "CRISPR CAS-9", "Neural Networks"];

const STYLE: &str = r#"
    *, *::before, *::after { box-sizing: border-box; }
    body {
      margin: 0; font-family: system-ui, -apple-system, sans-serif;
      background: #030712; color: #e5e7eb;
      display: flex; height: 100vh;
    }
    .chat { width: 40%; min-width: 320px; display: flex; flex-direction: column; border-right: 1px solid #1f2937; }
    .chat header { padding: 1rem 1.25rem; border-bottom: 1px solid #1f2937; }
    .chat header h1 { margin: 0; font-size: 1.1rem; }
    .chat header p { margin: 0.25rem 0 0; font-size: 0.8rem; color: #6b7280; }
    .messages { flex: 1; overflow-y: auto; padding: 1rem 1.25rem; }
    .msg { margin-bottom: 1rem; padding: 0.75rem 1rem; border-radius: 10px; line-height: 1.5; }
    .msg.user { background: #4f46e5; color: #fff; margin-left: 20%; }
    .msg.assistant { background: #111827; border: 1px solid #1f2937; }
    .msg.loading { color: #9ca3af; font-style: italic; }
    .welcome { text-align: center; color: #9ca3af; margin-top: 3rem; }
    .suggestions { display: grid; grid-template-columns: 1fr 1fr; gap: 0.5rem; margin-top: 1rem; }
    .suggestions button {
      padding: 0.75rem; border-radius: 8px; border: 1px solid #1f2937;
      background: #111827; color: #d1d5db; cursor: pointer; text-align: left;
    }
    .suggestions button:hover { border-color: #4f46e5; }
    form.ask { display: flex; gap: 0.5rem; padding: 1rem 1.25rem; border-top: 1px solid #1f2937; }
    form.ask input {
      flex: 1; padding: 0.6rem 0.8rem; border-radius: 8px;
      border: 1px solid #374151; background: #111827; color: #e5e7eb;
    }
    form.ask button { padding: 0.6rem 1rem; border-radius: 8px; border: 0; background: #4f46e5; color: #fff; }
    .graph { flex: 1; display: flex; align-items: center; justify-content: center; background: #111827; }
    .graph svg { max-width: 100%; max-height: 100%; }
"#;

// ── Form types ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct AskForm {
    #[serde(default)]
    query: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET / — transcript, ask form and graph.
pub(super) async fn root(State(state): State<AxumState>) -> Html<String> {
    let snapshot = state.comms.snapshot().await;
    Html(render_page(&snapshot, state.comms.svg_options()))
}

/// POST /ask — run the query, then show the page again.
pub(super) async fn ask(State(state): State<AxumState>, Form(form): Form<AskForm>) -> Response {
    if let Err(e) = state.comms.submit(&state.channel_id, form.query).await {
        warn!(channel_id = %state.channel_id, "submit failed: {e}");
    }
    Redirect::to("/").into_response()
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Render markdown to HTML. Raw HTML in the input is shown as text and
/// link or image targets with a non-web scheme become `#`.
pub(crate) fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link { link_type, dest_url, title, id }) if !is_safe_url(&dest_url) => {
            Event::Start(Tag::Link { link_type, dest_url: CowStr::Borrowed("#"), title, id })
        }
        Event::Start(Tag::Image { link_type, dest_url, title, id }) if !is_safe_url(&dest_url) => {
            Event::Start(Tag::Image { link_type, dest_url: CowStr::Borrowed("#"), title, id })
        }
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Relative URLs and http, https or mailto schemes.
fn is_safe_url(url: &str) -> bool {
    match url.trim().split_once(':') {
        Some((scheme, _)) if !scheme.contains(['/', '?', '#']) => {
            matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https" | "mailto")
        }
        _ => true,
    }
}

fn render_message(out: &mut String, msg: &ChatMessage) {
    match (msg.role, msg.is_loading) {
        (Role::User, _) => {
            let _ = writeln!(out, r#"<div class="msg user">{}</div>"#, escape_xml(&msg.content));
        }
        (Role::Assistant, true) => {
            out.push_str("<div class=\"msg assistant loading\">Analyzing topic structure…</div>\n");
        }
        (Role::Assistant, false) => {
            let _ = writeln!(out, r#"<div class="msg assistant">{}</div>"#, markdown_to_html(&msg.content));
        }
    }
}

fn render_welcome(out: &mut String) {
    out.push_str("<div class=\"welcome\"><p>Ask about any complex topic to map its structure.</p>\n");
    out.push_str("<form class=\"suggestions\" method=\"post\" action=\"/ask\">\n");
    for topic in SUGGESTIONS {
        let t = escape_xml(topic);
        let _ = writeln!(out, r#"<button name="query" value="{t}">Explain <strong>{t}</strong></button>"#);
    }
    out.push_str("</form></div>\n");
}

pub(crate) fn render_page(snapshot: &Snapshot, svg_options: &SvgOptions) -> String {
    let mut out = String::with_capacity(16 * 1024);
    out.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n");
    if snapshot.busy {
        out.push_str("<meta http-equiv=\"refresh\" content=\"2\" />\n");
    }
    let _ = writeln!(out, "<title>Nexus</title>\n<style>{STYLE}</style>\n</head>\n<body>");

    out.push_str("<section class=\"chat\">\n<header><h1>Nexus</h1><p>Knowledge graph explorer</p></header>\n");
    out.push_str("<div class=\"messages\">\n");
    if snapshot.messages.is_empty() {
        render_welcome(&mut out);
    } else {
        for msg in &snapshot.messages {
            render_message(&mut out, msg);
        }
    }
    out.push_str("</div>\n");

    let disabled = if snapshot.busy { " disabled" } else { "" };
    let _ = writeln!(
        out,
        r#"<form class="ask" method="post" action="/ask"><input name="query" placeholder="Enter a topic to explore…" autocomplete="off"{disabled} /><button type="submit"{disabled}>Ask</button></form>"#
    );
    out.push_str("</section>\n");

    out.push_str("<section class=\"graph\">\n");
    let graph = snapshot.graph.clone().unwrap_or_default();
    out.push_str(&render_svg(&graph, svg_options));
    out.push_str("</section>\n</body>\n</html>\n");
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt as _;

    use super::super::build_router;
    use super::super::test_support::dummy_state;
    use super::*;
    use crate::transcript::Transcript;

    fn snapshot_with(messages: Vec<ChatMessage>, busy: bool) -> Snapshot {
        Snapshot { messages, graph: None, busy }
    }

    #[test]
    fn markdown_renders_and_raw_html_is_escaped() {
        let html = markdown_to_html("# Title\n\n**bold** <script>alert(1)</script>");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn script_links_are_neutralised() {
        let html = markdown_to_html(
            "[x](javascript:alert(1)) [y](JavaScript:void(0)) ![i](data:image/png;base64,AAAA) \
             [ok](https://example.com/a) [mail](mailto:a@b.c) [rel](docs/page#part)",
        );
        assert!(!html.to_ascii_lowercase().contains("javascript:"));
        assert!(!html.contains("data:image"));
        assert!(html.contains(r#"href="https://example.com/a""#));
        assert!(html.contains(r#"href="mailto:a@b.c""#));
        assert!(html.contains(r#"href="docs/page#part""#));
        assert!(html.contains(r##"<a href="#">x</a>"##));
    }

    #[test]
    fn url_scheme_allow_list() {
        assert!(is_safe_url("http://a"));
        assert!(is_safe_url(" HTTPS://a"));
        assert!(is_safe_url("/relative:path"));
        assert!(is_safe_url("#anchor"));
        assert!(!is_safe_url("javascript:alert(1)"));
        assert!(!is_safe_url("vbscript:x"));
        assert!(!is_safe_url("java\tscript:x"));
    }

    #[test]
    fn empty_transcript_shows_suggestions() {
        let page = render_page(&snapshot_with(Vec::new(), false), &SvgOptions::default());
        for topic in SUGGESTIONS {
            assert!(page.contains(&format!(r#"value="{topic}""#)), "missing {topic}");
        }
        assert!(page.contains("Awaiting Input"));
        assert!(!page.contains("http-equiv=\"refresh\""));
    }

    #[test]
    fn user_text_is_escaped_and_loading_placeholder_shown() {
        let mut t = Transcript::new();
        t.push_user("<b>Rome</b>");
        t.push_placeholder();
        let page = render_page(&snapshot_with(t.to_vec(), true), &SvgOptions::default());
        assert!(page.contains("&lt;b&gt;Rome&lt;/b&gt;"));
        assert!(page.contains("msg assistant loading"));
        assert!(page.contains("http-equiv=\"refresh\""));
        assert!(page.contains(" disabled"));
    }

    #[tokio::test]
    async fn form_submit_redirects_and_page_shows_answer() {
        let state = dummy_state();
        let req = Request::builder()
            .method("POST")
            .uri("/ask")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("query=The+Fall+of+Rome"))
            .unwrap();
        let resp = build_router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");

        let resp = build_router(state)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains(r#"<div class="msg user">The Fall of Rome</div>"#));
        assert!(page.contains(r#"class="node core""#));
        assert!(!page.contains("Awaiting Input"));
    }

    #[tokio::test]
    async fn favicon_is_no_content() {
        let resp = build_router(dummy_state())
            .oneshot(Request::get("/favicon.ico").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
