//! Tests for the shipped config and prompt files.

use std::fs;
use std::path::Path;

use nexus::config;
use nexus::knowledge::SYSTEM_INSTRUCTION;

#[test]
fn test_system_prompt_file_exists() {
    let path = "config/prompts/system.txt";
    assert!(fs::metadata(path).is_ok(), "system.txt prompt file missing");
}

#[test]
fn test_system_prompt_matches_builtin() {
    let text = fs::read_to_string("config/prompts/system.txt").unwrap();
    assert!(text.contains("knowledge graph"), "system.txt should ask for a knowledge graph structure");
    assert_eq!(text.trim(), SYSTEM_INSTRUCTION);
}

#[test]
fn test_default_config_loads() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config::load_from(
        Path::new("config/default.toml"),
        Some(dir.path().to_str().unwrap()),
        None,
    )
    .unwrap();
    assert_eq!(cfg.llm.provider, "gemini");
    assert_eq!(cfg.llm.active_model(), "gemini-2.5-flash");
    assert_eq!(cfg.graph.radius, 180.0);
    assert_eq!(cfg.graph.svg_output, Some(dir.path().join("graph.svg")));
    assert_eq!(cfg.transcript_cap, Some(200));
    assert_eq!(
        cfg.knowledge.system_prompt_file.as_deref(),
        Some(Path::new("config/prompts/system.txt"))
    );
    assert!(cfg.comms_axum_should_load());
}
