//! Standalone SVG rendering of a [`GraphData`].
//!
//! Coordinates in the graph are relative to the core node; the renderer
//! shifts everything by `(width / 2, height / 2)`. Node descriptions become
//! `<title>` children, which browsers show as hover tooltips.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{GraphData, NodeKind};
use crate::config::GraphConfig;
use crate::error::AppError;

const CORE_RADIUS: f64 = 25.0;
const CONCEPT_RADIUS: f64 = 18.0;
const EDGE_COLOR: &str = "#6366f1";

#[derive(Debug, Clone, Copy)]
pub struct SvgOptions {
    pub width: f64,
    pub height: f64,
    /// Emit the SMIL pulse animation on the core node.
    pub animate: bool,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self { width: 800.0, height: 600.0, animate: true }
    }
}

/// Escape text for use in SVG character data and attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Render `graph` as a complete SVG document.
///
/// An empty graph renders the "Awaiting Input" placeholder. Edges whose
/// endpoints are missing are skipped.
pub fn render_svg(graph: &GraphData, options: &SvgOptions) -> String {
    let (w, h) = (options.width, options.height);
    let mut out = String::with_capacity(4096);

    // `write!` into a String cannot fail.
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="system-ui, sans-serif">"#
    );
    let _ = writeln!(out, r##"<rect width="100%" height="100%" fill="#111827"/>"##);

    if graph.is_empty() {
        render_placeholder(&mut out, w, h);
        out.push_str("</svg>\n");
        return out;
    }

    out.push_str(concat!(
        "<defs>\n",
        r##"<marker id="arrowhead" markerWidth="10" markerHeight="7" refX="28" refY="3.5" orient="auto">"##,
        r##"<polygon points="0 0, 10 3.5, 0 7" fill="#6366f1" opacity="0.6"/></marker>"##,
        "\n",
        r#"<filter id="glow"><feGaussianBlur stdDeviation="2.5" result="coloredBlur"/>"#,
        r#"<feMerge><feMergeNode in="coloredBlur"/><feMergeNode in="SourceGraphic"/></feMerge></filter>"#,
        "\n</defs>\n",
    ));

    let (cx, cy) = (w / 2.0, h / 2.0);

    out.push_str("<g class=\"edges\">\n");
    for edge in &graph.edges {
        let (Some(source), Some(target)) = (graph.node(&edge.source), graph.node(&edge.target)) else {
            debug!(source = %edge.source, target = %edge.target, "skipping edge with missing endpoint");
            continue;
        };
        let (x1, y1) = (source.x + cx, source.y + cy);
        let (x2, y2) = (target.x + cx, target.y + cy);
        let _ = writeln!(
            out,
            r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}" stroke="{EDGE_COLOR}" stroke-width="1.5" stroke-opacity="0.4" marker-end="url(#arrowhead)"/>"#
        );
        if let Some(relation) = &edge.relation {
            let (mx, my) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0 - 6.0);
            let _ = writeln!(
                out,
                r##"<text x="{mx:.2}" y="{my:.2}" text-anchor="middle" fill="#818cf8" font-size="10" opacity="0.8">{}</text>"##,
                escape_xml(relation)
            );
        }
    }
    out.push_str("</g>\n");

    out.push_str("<g class=\"nodes\">\n");
    for node in &graph.nodes {
        let is_core = node.kind == NodeKind::Core;
        let (x, y) = (node.x + cx, node.y + cy);
        let _ = writeln!(
            out,
            r#"<g id="{}" class="node {}" transform="translate({x:.2}, {y:.2})">"#,
            escape_xml(&node.id),
            kind_class(node.kind)
        );
        let _ = writeln!(
            out,
            "<title>{}: {}</title>",
            escape_xml(&node.label),
            escape_xml(&node.description)
        );
        if is_core {
            out.push_str(r##"<circle r="30" fill="#4f46e5" opacity="0.2">"##);
            if options.animate {
                out.push_str(concat!(
                    r#"<animate attributeName="r" values="30;40;30" dur="3s" repeatCount="indefinite"/>"#,
                    r#"<animate attributeName="opacity" values="0.2;0;0.2" dur="3s" repeatCount="indefinite"/>"#,
                ));
            }
            out.push_str("</circle>\n");
            let _ = writeln!(
                out,
                r##"<circle r="{CORE_RADIUS}" fill="#4f46e5" stroke="#818cf8" stroke-width="2" filter="url(#glow)"/>"##
            );
        } else {
            let _ = writeln!(
                out,
                r##"<circle r="{CONCEPT_RADIUS}" fill="#1f2937" stroke="#374151" stroke-width="2"/>"##
            );
        }
        let (label_y, font_size, weight) = if is_core { (45, 14, 600) } else { (35, 12, 400) };
        let _ = writeln!(
            out,
            r##"<text y="{label_y}" text-anchor="middle" fill="#9ca3af" font-size="{font_size}" font-weight="{weight}">{}</text>"##,
            escape_xml(&node.label)
        );
        out.push_str("</g>\n");
    }
    out.push_str("</g>\n");

    render_legend(&mut out, w, h);
    out.push_str("</svg>\n");
    out
}

fn kind_class(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Core => "core",
        NodeKind::Concept => "concept",
        NodeKind::Detail => "detail",
    }
}

fn render_placeholder(out: &mut String, w: f64, h: f64) {
    let (cx, cy) = (w / 2.0, h / 2.0);
    let _ = writeln!(out, r##"<circle cx="{cx}" cy="{:.2}" r="40" fill="#1f2937"/>"##, cy - 60.0);
    let _ = writeln!(
        out,
        r##"<text x="{cx}" y="{:.2}" text-anchor="middle" fill="#ffffff" font-size="20" font-weight="600">Awaiting Input</text>"##,
        cy + 10.0
    );
    let _ = writeln!(
        out,
        r##"<text x="{cx}" y="{:.2}" text-anchor="middle" fill="#9ca3af" font-size="14">Enter a complex topic in the chat to generate a knowledge graph.</text>"##,
        cy + 40.0
    );
}

fn render_legend(out: &mut String, w: f64, h: f64) {
    let x = w - 260.0;
    let y = h - 30.0;
    let _ = writeln!(
        out,
        r##"<g class="legend" font-size="12" fill="#9ca3af"><circle cx="{:.2}" cy="{y:.2}" r="5" fill="#6366f1"/><text x="{:.2}" y="{:.2}">Core Topic</text><circle cx="{:.2}" cy="{y:.2}" r="5" fill="#374151" stroke="#6b7280"/><text x="{:.2}" y="{:.2}">Related Concept</text></g>"##,
        x,
        x + 10.0,
        y + 4.0,
        x + 110.0,
        x + 120.0,
        y + 4.0
    );
}

/// Render and write `graph` to `path`, creating parent directories.
pub async fn write_svg(path: &Path, graph: &GraphData, options: &SvgOptions) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::Render(format!("cannot create {}: {e}", parent.display())))?;
    }
    tokio::fs::write(path, render_svg(graph, options))
        .await
        .map_err(|e| AppError::Render(format!("cannot write {}: {e}", path.display())))?;
    debug!(path = %path.display(), nodes = graph.nodes.len(), "graph svg written");
    Ok(())
}

/// Where the latest graph is written after each answered query.
#[derive(Debug, Clone, Default)]
pub struct SvgArtifact {
    pub path: Option<PathBuf>,
    pub options: SvgOptions,
}

impl SvgArtifact {
    pub fn from_config(graph: &GraphConfig) -> Self {
        Self {
            path: graph.svg_output.clone(),
            options: SvgOptions { width: graph.width, height: graph.height, animate: true },
        }
    }

    /// Write `graph` if an output path is configured. Failures are logged,
    /// not returned: a lost file never fails the query that produced it.
    pub async fn persist(&self, graph: &GraphData) -> Option<&Path> {
        let path = self.path.as_deref()?;
        match write_svg(path, graph, &self.options).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("graph svg not written: {e}");
                None
            }
        }
    }
}
