//! Integration tests for arbiter
//!
//! These tests need the real language toolchains of the example
//! configuration (python3, node, javac/java, g++, gcc, rustc, go) on PATH.
//! Run with: cargo test -p arbiter --features integration-tests

#![cfg(feature = "integration-tests")]

use std::fs;
use std::path::Path;

use arbiter::{Config, Runner};

mod compilation;
mod config_loading;
mod execution;
mod gateway;
mod judging;
mod resource_limits;
mod workspace_cleanup;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Default configuration with workspaces placed under `root`
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.workspace_root = root.to_path_buf();
    config
}

pub(crate) fn test_runner(root: &Path) -> Runner {
    Runner::new(test_config(root))
}

/// Number of entries left in a workspace root
pub(crate) fn leftover_entries(root: &Path) -> usize {
    fs::read_dir(root).map(|entries| entries.count()).unwrap_or(0)
}
