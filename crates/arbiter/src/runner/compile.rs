//! Compilation step for code execution
//!
//! Handles compiling source code using language-specific compilers.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::config::{Config, Language};
use crate::runner::CompileError;
use crate::runner::process::{ProcessCommand, Termination};
use crate::workspace::Workspace;

/// Result of a compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileResult {
    /// The artifact was built; `run_command` starts it
    Compiled {
        run_command: Vec<String>,
        duration_ms: u64,
    },

    /// The compiler rejected the source or ran out of time
    Failed {
        /// Combined compiler output, or a generated message if there was none
        diagnostics: String,
        exit_code: Option<i32>,
        timed_out: bool,
    },
}

impl CompileResult {
    /// Check if compilation was successful
    pub fn is_success(&self) -> bool {
        matches!(self, CompileResult::Compiled { .. })
    }

    /// Compiler diagnostics of a failed build
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            CompileResult::Compiled { .. } => None,
            CompileResult::Failed { diagnostics, .. } => Some(diagnostics),
        }
    }
}

/// Compile the source already written to the workspace
#[instrument(skip(workspace, config, language), fields(workspace_id = %workspace.id(), language = %language.name))]
pub async fn compile(
    workspace: &Workspace,
    config: &Config,
    language: &Language,
) -> Result<CompileResult, CompileError> {
    let compile_config = language
        .compile_config()
        .ok_or_else(|| CompileError::NotCompiled(language.name.clone()))?;

    let source_name = language.source_name();
    if !workspace.file_exists(&source_name).await? {
        return Err(CompileError::SourceMissing(source_name));
    }

    let command = language
        .compile_command()
        .ok_or_else(|| CompileError::NotCompiled(language.name.clone()))?;
    let timeout = Duration::from_millis(language.compile_timeout_ms);
    let limit = config.limits.compile_output_limit_bytes;

    debug!(?command, ?timeout, "compiling");

    let output = ProcessCommand::new(command, workspace.path())
        .path(compile_config.path.as_str())
        .envs(&compile_config.env)
        .timeout(timeout)
        .output_limits(limit, limit)
        .kill_on_output_limit(false)
        .run()
        .await?;

    let duration_ms = output.elapsed.as_millis() as u64;

    if output.success() {
        debug!(duration_ms, "compilation complete");
        return Ok(CompileResult::Compiled {
            run_command: language.run_command(),
            duration_ms,
        });
    }

    // Combine stdout and stderr for compiler output
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut diagnostics = String::with_capacity(stdout.len() + stderr.len() + 1);
    diagnostics.push_str(&stdout);
    if !diagnostics.is_empty() && !stderr.is_empty() && !diagnostics.ends_with('\n') {
        diagnostics.push('\n');
    }
    diagnostics.push_str(&stderr);
    truncate_at_char_boundary(&mut diagnostics, limit);

    let timed_out = output.termination == Termination::TimedOut;
    if timed_out {
        if !diagnostics.is_empty() && !diagnostics.ends_with('\n') {
            diagnostics.push('\n');
        }
        diagnostics.push_str(&format!(
            "Compilation timed out after {} ms",
            language.compile_timeout_ms
        ));
    } else if diagnostics.trim().is_empty() {
        diagnostics = match output.termination {
            Termination::Exited {
                code: Some(code), ..
            } => format!("Compiler exited with code {code}"),
            Termination::Exited {
                signal: Some(signal),
                ..
            } => format!("Compiler terminated by signal {signal}"),
            _ => "Compilation failed".to_string(),
        };
    }

    debug!(
        exit_code = ?output.exit_code(),
        timed_out,
        duration_ms,
        "compilation failed"
    );

    Ok(CompileResult::Failed {
        diagnostics,
        exit_code: output.exit_code(),
        timed_out,
    })
}

fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}
