//! A library for compiling, running, and judging untrusted code.
//!
//! Arbiter provides an async Rust API that takes source code in one of
//! several languages, builds it when needed, runs it under wall-clock and
//! output bounds, and scores its output against weighted test cases.
//!
//! # Features
//!
//! - **Ephemeral workspaces** - one UUID-named directory per execution, always removed.
//! - **Multi-language** - compiled and interpreted toolchains from TOML configuration.
//! - **Bounded execution** - SIGKILL on timeout, capped stdout and stderr.
//! - **Judging** - whitespace-normalized comparison, weighted partial credit.
//! - **HTTP gateway** - axum service with API key auth and per-caller rate limits.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language, Toolchain};
pub use gateway::{GatewayError, TestCasePayload, router, serve, serve_on};
pub use judge::{CaseResult, CaseStatus, JudgeError, JudgeRequest, JudgeVerdict, VerdictStatus};
pub use runner::{CompileError, CompileResult, ExecuteError, Runner};
pub use types::{Classification, ExecutionLimits, ExecutionOutcome, ExecutionRequest, TestCase};
pub use workspace::{SweepReport, Workspace, WorkspaceError, WorkspaceManager};

pub mod config;
pub mod gateway;
pub mod judge;
pub mod runner;
pub mod types;
pub mod workspace;
