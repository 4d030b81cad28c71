//! Configuration file loading for Arbiter
//!
//! Handles loading and parsing configuration files using the config crate.
//! Values from the file (or the embedded example) can be overridden through
//! `ARBITER__*` environment variables, e.g. `ARBITER__SERVER__API_KEY`.

use std::collections::HashMap;
use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG};

impl Config {
    /// Load configuration from a file, without environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        Self::finish(config.try_deserialize()?)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        Self::finish(config.try_deserialize()?)
    }

    /// Load the service configuration
    ///
    /// Reads `path` when given, the embedded example configuration otherwise,
    /// then applies `ARBITER__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::builder();
        let builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml)),
        };
        let config = builder.add_source(env).build()?;

        Self::finish(config.try_deserialize()?)
    }

    fn finish(mut config: Config) -> Result<Self, ConfigError> {
        config.normalize()?;
        config.validate()?;
        Ok(config)
    }

    /// Lowercase all language IDs
    fn normalize(&mut self) -> Result<(), ConfigError> {
        let mut languages = HashMap::with_capacity(self.languages.len());
        for (id, lang) in self.languages.drain() {
            let lower = id.to_ascii_lowercase();
            if languages.insert(lower.clone(), lang).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "language id '{lower}' is defined more than once"
                )));
            }
        }
        self.languages = languages;
        Ok(())
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_executions == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_executions must be at least 1".to_string(),
            ));
        }
        if self.limits.max_run_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_run_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.server.rate_limit_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.rate_limit_window_secs must be non-zero".to_string(),
            ));
        }

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }
            if lang.run_config().command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
            if let Some(compile) = lang.compile_config() {
                if compile.command.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' has empty compile command"
                    )));
                }
                if compile.output_name.is_empty() || compile.output_name.contains('/') {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' has invalid compile output name"
                    )));
                }
            }
            if lang.compile_timeout_ms == 0 || lang.default_run_timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has a zero timeout"
                )));
            }
            if let Some(ref class) = lang.entry_class
                && (class.is_empty() || !class.chars().all(|c| c.is_alphanumeric() || c == '_'))
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has invalid entry class '{class}'"
                )));
            }
        }

        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[languages.test]
name = "Test Language"
extension = "test"

[languages.test.run]
command = ["./test"]
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse_toml(MINIMAL).unwrap();
        assert!(config.languages.contains_key("test"));
        let lang = &config.languages["test"];
        assert_eq!(lang.name, "Test Language");
        assert!(!lang.is_compiled());
        assert_eq!(lang.default_run_timeout_ms, 5_000);
        assert_eq!(lang.compile_timeout_ms, 10_000);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
workspace_root = "/var/tmp/arbiter"
max_concurrent_executions = 2

[limits]
stdout_limit_bytes = 2048
max_run_timeout_ms = 10000

[sweep]
retention_secs = 30

[server]
bind = "127.0.0.1:9000"
api_key = "secret"
rate_limit_requests = 5

[languages.cpp]
name = "C++ 17 (GCC)"
extension = "cpp"
compile_timeout_ms = 20000
default_run_timeout_ms = 2000

[languages.cpp.compile]
command = ["g++", "-std=c++17", "-O2", "{source}", "-o", "{output}"]
output_name = "solution"

[languages.cpp.run]
command = ["./{binary}"]
"#;

        let config = Config::parse_toml(toml).unwrap();
        assert_eq!(
            config.workspace_root,
            std::path::PathBuf::from("/var/tmp/arbiter")
        );
        assert_eq!(config.max_concurrent_executions, 2);
        assert_eq!(config.limits.stdout_limit_bytes, 2048);
        // Unspecified limits keep their defaults
        assert_eq!(config.limits.stderr_limit_bytes, 10 * 1024);
        assert_eq!(config.limits.max_run_timeout_ms, 10_000);
        assert_eq!(config.sweep.retention_secs, 30);
        assert_eq!(config.sweep.interval_secs, 60);
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
        assert_eq!(config.server.rate_limit_requests, 5);
        assert_eq!(config.server.rate_limit_window_secs, 60);
        assert!(!config.server.trust_forwarded_for);

        let cpp = &config.languages["cpp"];
        assert!(cpp.is_compiled());
        assert_eq!(cpp.compile_timeout_ms, 20_000);
        assert_eq!(cpp.run_command(), vec!["./solution"]);
    }

    #[test]
    fn test_default_languages_included() {
        let config = Config::default();
        for id in ["python", "javascript", "java", "cpp", "c", "rust", "go"] {
            assert!(config.languages.contains_key(id), "missing {id}");
        }
        assert_eq!(
            config.languages["java"].entry_class.as_deref(),
            Some("Solution")
        );
        assert!(!config.languages["python"].is_compiled());
        assert!(config.languages["go"].is_compiled());
    }

    #[test]
    fn test_language_ids_are_lowercased() {
        let toml = r#"
[languages.Shell]
name = "Shell"
extension = "sh"

[languages.Shell.run]
command = ["sh", "{source}"]
"#;
        let config = Config::parse_toml(toml).unwrap();
        assert!(config.languages.contains_key("shell"));
        assert!(config.resolve("SHELL").is_ok());
    }

    #[test]
    fn test_invalid_empty_name() {
        let toml = r#"
[languages.test]
name = ""
extension = "test"

[languages.test.run]
command = ["./test"]
"#;

        let result = Config::parse_toml(toml);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_empty_run_command() {
        let toml = r#"
[languages.test]
name = "Test"
extension = "test"

[languages.test.run]
command = []
"#;

        assert!(matches!(
            Config::parse_toml(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_empty_compile_command() {
        let toml = r#"
[languages.test]
name = "Test"
extension = "test"

[languages.test.compile]
command = []
output_name = "out"

[languages.test.run]
command = ["./{binary}"]
"#;

        assert!(matches!(
            Config::parse_toml(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_extension() {
        let toml = r#"
[languages.test]
name = "Test"
extension = ".py"

[languages.test.run]
command = ["python3", "{source}"]
"#;

        assert!(matches!(
            Config::parse_toml(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_zero_timeout() {
        let toml = r#"
[languages.test]
name = "Test"
extension = "test"
default_run_timeout_ms = 0

[languages.test.run]
command = ["./test"]
"#;

        assert!(matches!(
            Config::parse_toml(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_zero_concurrency() {
        let toml = "max_concurrent_executions = 0\n";
        assert!(matches!(
            Config::parse_toml(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbiter.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.languages.contains_key("test"));
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_file(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<String, String> = [
            ("ARBITER__SERVER__API_KEY", "from-env"),
            ("ARBITER__MAX_CONCURRENT_EXECUTIONS", "3"),
            ("UNRELATED__VALUE", "ignored"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::load_with_env(None, environment().source(Some(vars))).unwrap();
        assert_eq!(config.server.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.max_concurrent_executions, 3);
        assert!(config.languages.contains_key("python"));
    }
}
