use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Output and timing bounds applied to every compilation and execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Maximum captured stdout of a run, in bytes
    #[serde(default = "default_stdout_limit")]
    pub stdout_limit_bytes: usize,

    /// Maximum captured stderr of a run, in bytes
    #[serde(default = "default_stderr_limit")]
    pub stderr_limit_bytes: usize,

    /// Maximum captured compiler output (per stream), in bytes
    #[serde(default = "default_compile_output_limit")]
    pub compile_output_limit_bytes: usize,

    /// Upper bound for a caller-supplied run timeout, in milliseconds
    #[serde(default = "default_max_run_timeout")]
    pub max_run_timeout_ms: u64,
}

impl ExecutionLimits {
    /// 1 kilobyte in bytes
    pub const KB: usize = 1024;

    /// Create limits with the default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stdout cap in bytes
    pub fn with_stdout_limit(mut self, bytes: usize) -> Self {
        self.stdout_limit_bytes = bytes;
        self
    }

    /// Set the stderr cap in bytes
    pub fn with_stderr_limit(mut self, bytes: usize) -> Self {
        self.stderr_limit_bytes = bytes;
        self
    }

    /// Set the compiler output cap in bytes
    pub fn with_compile_output_limit(mut self, bytes: usize) -> Self {
        self.compile_output_limit_bytes = bytes;
        self
    }

    /// Set the maximum run timeout in milliseconds
    pub fn with_max_run_timeout(mut self, ms: u64) -> Self {
        self.max_run_timeout_ms = ms;
        self
    }

    /// Clamp a run timeout into `1..=max_run_timeout_ms`
    pub fn clamp_run_timeout(&self, ms: u64) -> Duration {
        Duration::from_millis(ms.clamp(1, self.max_run_timeout_ms.max(1)))
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            stdout_limit_bytes: default_stdout_limit(),
            stderr_limit_bytes: default_stderr_limit(),
            compile_output_limit_bytes: default_compile_output_limit(),
            max_run_timeout_ms: default_max_run_timeout(),
        }
    }
}

fn default_stdout_limit() -> usize {
    100 * ExecutionLimits::KB
}

fn default_stderr_limit() -> usize {
    10 * ExecutionLimits::KB
}

fn default_compile_output_limit() -> usize {
    64 * ExecutionLimits::KB
}

fn default_max_run_timeout() -> u64 {
    30_000
}

/// Classification of a single execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Program exited with code 0 within its limits
    Success,

    /// Non-zero exit, death by signal, or output cap violation
    RuntimeError,

    /// Killed after exceeding its wall-clock limit
    TimeLimitExceeded,

    /// The build step failed; the program never ran
    CompilationError,

    /// Spawn failure or another fault of the engine itself
    InternalError,
}

impl Classification {
    /// Wire name of the classification (e.g. `TIME_LIMIT_EXCEEDED`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Success => "SUCCESS",
            Classification::RuntimeError => "RUNTIME_ERROR",
            Classification::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            Classification::CompilationError => "COMPILATION_ERROR",
            Classification::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request to run a piece of code once
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Language ID (case-insensitive)
    pub language: String,

    /// Source code of the program
    pub source: String,

    /// Data written to the program's stdin
    pub stdin: String,

    /// Wall-clock limit in milliseconds; the language default applies when `None`
    pub timeout_ms: Option<u64>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source: source.into(),
            stdin: String::new(),
            timeout_ms: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }
}

/// Everything observed about one execution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Whether the classification is `Success`
    pub succeeded: bool,

    /// Captured standard output (lossy UTF-8, capped)
    pub stdout: String,

    /// Captured standard error, compiler diagnostics, or an engine message
    pub stderr: String,

    /// Exit code if the process exited on its own
    pub exit_code: Option<i32>,

    /// Whether the process was killed because its timer fired
    pub was_killed_by_timeout: bool,

    /// Whether the process was killed for exceeding an output cap
    pub output_limit_exceeded: bool,

    /// Wall-clock runtime in milliseconds (the timeout value for TLE)
    pub runtime_ms: u64,

    pub classification: Classification,
}

impl ExecutionOutcome {
    /// Outcome for a fault of the engine (spawn failure and the like)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            stdout: String::new(),
            stderr: message.into(),
            exit_code: None,
            was_killed_by_timeout: false,
            output_limit_exceeded: false,
            runtime_ms: 0,
            classification: Classification::InternalError,
        }
    }

    /// Outcome for a submission whose build step failed
    pub fn compilation_error(diagnostics: impl Into<String>) -> Self {
        Self {
            classification: Classification::CompilationError,
            ..Self::internal_error(diagnostics)
        }
    }

    /// Human-readable error text, `None` for successful runs
    pub fn error_text(&self) -> Option<String> {
        match self.classification {
            Classification::Success => None,
            Classification::TimeLimitExceeded => {
                Some(format!("Time limit exceeded ({} ms)", self.runtime_ms))
            }
            Classification::RuntimeError if self.output_limit_exceeded => {
                Some("Output limit exceeded".to_string())
            }
            Classification::RuntimeError if self.stderr.trim().is_empty() => {
                Some(match self.exit_code {
                    Some(code) => format!("Runtime error (exit code {code})"),
                    None => "Runtime error (terminated by signal)".to_string(),
                })
            }
            _ => Some(self.stderr.clone()),
        }
    }
}

/// One weighted (input, expected output) pair
///
/// `input` and `expected_output` are optional so a malformed case can still
/// be carried through a batch and reported on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub input: Option<String>,
    pub expected_output: Option<String>,
    pub points: u32,
}

impl TestCase {
    /// Points awarded for a case that does not specify any
    pub const DEFAULT_POINTS: u32 = 1;

    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
            expected_output: Some(expected_output.into()),
            points: Self::DEFAULT_POINTS,
        }
    }

    pub fn with_points(mut self, points: u32) -> Self {
        self.points = points;
        self
    }

    /// Name of the first missing field, if any
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.input.is_none() {
            Some("input")
        } else if self.expected_output.is_none() {
            Some("expectedOutput")
        } else {
            None
        }
    }
}
