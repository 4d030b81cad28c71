//! Code runner for Arbiter
//!
//! Provides high-level APIs for compiling and executing code in workspaces.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument};

pub use crate::runner::compile::{CompileResult, compile};
pub use crate::runner::execute::{classify, execute};
pub use crate::runner::process::{
    ProcessCommand, ProcessError, ProcessOutput, Stream, Termination, resolve_program,
};

mod compile;
mod execute;
pub mod process;

use crate::config::{Config, ConfigError, Language};
use crate::judge::{JudgeError, JudgeRequest, JudgeVerdict};
use crate::types::{ExecutionOutcome, ExecutionRequest};
use crate::workspace::{Workspace, WorkspaceError, WorkspaceManager};

/// Errors that occur during compilation
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("language '{0}' does not support compilation")]
    NotCompiled(String),

    #[error("source file '{0}' not found in workspace")]
    SourceMissing(String),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("failed to run compiler: {0}")]
    Spawn(#[from] ProcessError),
}

/// Errors that occur during execution
///
/// Everything the submitted program does is reported in the outcome; these
/// are faults of the request or of the host.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

/// High-level runner for code execution
///
/// Cheap to clone; clones share the configuration and the workspace pool.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
    workspaces: Arc<WorkspaceManager>,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        let workspaces = Arc::new(WorkspaceManager::from_config(&config));
        Self {
            config: Arc::new(config),
            workspaces,
        }
    }

    /// Create a runner sharing an existing workspace manager
    pub fn with_workspaces(config: Arc<Config>, workspaces: Arc<WorkspaceManager>) -> Self {
        Self { config, workspaces }
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the workspace manager
    pub fn workspaces(&self) -> &Arc<WorkspaceManager> {
        &self.workspaces
    }

    /// Look up a language by ID, ignoring case
    pub fn resolve(&self, language: &str) -> Result<&Language, ConfigError> {
        self.config.resolve(language)
    }

    /// Run timeout for a request, falling back to the language default
    pub fn effective_timeout(&self, language: &Language, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms.unwrap_or(language.default_run_timeout_ms);
        self.config.limits.clamp_run_timeout(ms)
    }

    /// Compile the source in a workspace
    pub async fn compile(
        &self,
        workspace: &Workspace,
        language: &Language,
    ) -> Result<CompileResult, CompileError> {
        compile::compile(workspace, &self.config, language).await
    }

    /// Get the command that runs the workspace's source
    ///
    /// Compiles first for compiled languages; interpreted languages are
    /// ready immediately.
    pub async fn prepare(
        &self,
        workspace: &Workspace,
        language: &Language,
    ) -> Result<CompileResult, CompileError> {
        if language.is_compiled() {
            self.compile(workspace, language).await
        } else {
            Ok(CompileResult::Compiled {
                run_command: language.run_command(),
                duration_ms: 0,
            })
        }
    }

    /// Run a prepared program with the given input
    pub async fn run(
        &self,
        workspace: &Workspace,
        language: &Language,
        command: &[String],
        stdin: &str,
        timeout: Duration,
    ) -> ExecutionOutcome {
        execute::execute(workspace, &self.config, language, command, stdin, timeout).await
    }

    /// Compile if needed and run a single submission
    ///
    /// The workspace is released before returning, whatever the outcome.
    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, ExecuteError> {
        let language = self.resolve(&request.language)?;
        let timeout = self.effective_timeout(language, request.timeout_ms);

        let workspace = self.workspaces.acquire().await?;
        let result = self.execute_in(&workspace, language, request, timeout).await;
        workspace.release().await;

        if let Ok(ref outcome) = result {
            info!(
                classification = %outcome.classification,
                runtime_ms = outcome.runtime_ms,
                "execution finished"
            );
        }
        result
    }

    async fn execute_in(
        &self,
        workspace: &Workspace,
        language: &Language,
        request: &ExecutionRequest,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, ExecuteError> {
        workspace.write_source(language, &request.source).await?;

        let command = match self.prepare(workspace, language).await {
            Ok(CompileResult::Compiled { run_command, .. }) => run_command,
            Ok(CompileResult::Failed { diagnostics, .. }) => {
                return Ok(ExecutionOutcome::compilation_error(diagnostics));
            }
            Err(CompileError::Workspace(e)) => return Err(e.into()),
            Err(e) => return Ok(ExecutionOutcome::internal_error(e.to_string())),
        };

        Ok(self
            .run(workspace, language, &command, &request.stdin, timeout)
            .await)
    }

    /// Judge a submission against a batch of test cases
    pub async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        crate::judge::judge(self, request).await
    }
}
