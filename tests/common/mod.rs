//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::PathBuf;
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Regional office index: two categories over a `Region`/`City` table, sorted on `City`.
#[allow(dead_code)]
pub const OFFICES_JSON: &str = r#"{
  "columns": ["Region", "City"],
  "key_columns": [1],
  "nodes": [
    { "category": { "title": "East", "children": [
      { "document": { "note_id": 4, "columns": [
        { "type": "text", "value": "East" }, { "type": "text", "value": "Albany" } ] } },
      { "document": { "note_id": 8, "unread": true, "columns": [
        { "type": "text", "value": "East" }, { "type": "text", "value": "Boston" } ] } }
    ] } },
    { "category": { "title": "West", "children": [
      { "document": { "note_id": 12, "columns": [
        { "type": "text", "value": "West" }, { "type": "text", "value": "Denver" } ] } }
    ] } }
  ]
}"#;

/// Write [OFFICES_JSON] into `temp_dir` and return its path.
#[allow(dead_code)]
pub fn write_offices_fixture(temp_dir: &TempDir) -> PathBuf {
    let path = temp_dir.path().join("offices.json");
    std::fs::write(&path, OFFICES_JSON).unwrap();
    path
}
