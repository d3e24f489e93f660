// Library root — exposes the explorer for the binary and integration tests.
// The binary entry point is src/main.rs.

pub mod error;
pub mod config;
pub mod logger;
pub mod llm;
pub mod knowledge;
pub mod graph;
pub mod transcript;
pub mod explorer;
pub mod runtime;
pub mod comms;
