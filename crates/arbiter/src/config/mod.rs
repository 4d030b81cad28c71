use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    CompileConfig, DEFAULT_PATH, FileExtension, Language, RunConfig, Toolchain,
};
use crate::types::ExecutionLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../arbiter.example.toml");

/// Prefix of environment variables that override configuration values
pub const ENV_PREFIX: &str = "ARBITER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Arbiter
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory under which per-execution workspaces are created
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Number of executions allowed to hold a workspace at the same time.
    /// Further requests queue until a slot frees up.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_executions: usize,

    /// Output and timeout bounds applied to every execution
    #[serde(default)]
    pub limits: ExecutionLimits,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// Language configurations keyed by lowercase language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

/// Orphaned workspace sweep settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SweepConfig {
    /// Age after which an unowned workspace directory is deleted
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Delay between two sweeps of the workspace root
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            interval_secs: default_interval_secs(),
        }
    }
}

/// HTTP gateway settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Shared secret expected in the `x-api-key` header.
    ///
    /// Authentication is disabled when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,

    /// Requests allowed per caller in one window
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Key the rate limit on the first `x-forwarded-for` hop instead of the
    /// peer address. Only enable behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_key: None,
            max_body_bytes: default_max_body_bytes(),
            max_source_bytes: default_max_source_bytes(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            trust_forwarded_for: false,
        }
    }
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            max_concurrent_executions: default_max_concurrent(),
            limits: ExecutionLimits::default(),
            sweep: SweepConfig::default(),
            server: ServerConfig::default(),
            languages: HashMap::new(),
        }
    }

    /// Look up a language by ID, ignoring case
    pub fn resolve(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(&id.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::UnsupportedLanguage(id.to_string()))
    }

    /// All configured languages, sorted by ID
    pub fn sorted_languages(&self) -> Vec<(&str, &Language)> {
        let mut languages: Vec<_> = self
            .languages
            .iter()
            .map(|(id, lang)| (id.as_str(), lang))
            .collect();
        languages.sort_by(|a, b| a.0.cmp(b.0));
        languages
    }

    /// Sorted language IDs
    pub fn language_ids(&self) -> Vec<&str> {
        self.sorted_languages().into_iter().map(|(id, _)| id).collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("arbiter")
}

fn default_max_concurrent() -> usize {
    8
}

fn default_retention_secs() -> u64 {
    600
}

fn default_interval_secs() -> u64 {
    60
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_owned()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_max_source_bytes() -> usize {
    50_000
}

fn default_rate_limit_requests() -> u32 {
    60
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

/// Config with two `/bin/sh` based languages for process-level tests
///
/// `sh` runs the source directly, `shc` goes through a build step that
/// syntax-checks the script and copies it to an artifact.
#[cfg(test)]
pub(crate) fn shell_test_config(workspace_root: &std::path::Path) -> Config {
    let toml = r#"
max_concurrent_executions = 4

[languages.sh]
name = "POSIX shell"
extension = "sh"
default_run_timeout_ms = 2000

[languages.sh.run]
command = ["sh", "{source}"]

[languages.shc]
name = "POSIX shell (checked)"
extension = "sh"
default_run_timeout_ms = 2000
compile_timeout_ms = 2000

[languages.shc.compile]
command = ["sh", "-c", "sh -n {source} && cp {source} {output} && chmod +x {output}"]
output_name = "solution.bin"

[languages.shc.run]
command = ["sh", "{binary}"]
"#;
    let mut config = Config::parse_toml(toml).expect("test config should be valid");
    config.workspace_root = workspace_root.to_path_buf();
    config
}
