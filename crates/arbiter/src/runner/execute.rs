//! Execution step for code running
//!
//! Runs a compiled artifact or interpreted source with the given input and
//! classifies how it ended.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::config::{Config, Language};
use crate::runner::process::{ProcessCommand, ProcessOutput, Termination};
use crate::types::{Classification, ExecutionOutcome};
use crate::workspace::Workspace;

/// Run a program in a workspace
///
/// Never fails: a program that cannot be started is reported as an
/// `InternalError` outcome.
#[instrument(skip(workspace, config, language, stdin), fields(workspace_id = %workspace.id(), language = %language.name))]
pub async fn execute(
    workspace: &Workspace,
    config: &Config,
    language: &Language,
    command: &[String],
    stdin: &str,
    timeout: Duration,
) -> ExecutionOutcome {
    let run_config = language.run_config();

    debug!(?command, ?timeout, "executing program");

    let result = ProcessCommand::new(command.to_vec(), workspace.path())
        .path(run_config.path.as_str())
        .envs(&run_config.env)
        .stdin(stdin.as_bytes())
        .timeout(timeout)
        .output_limits(
            config.limits.stdout_limit_bytes,
            config.limits.stderr_limit_bytes,
        )
        .run()
        .await;

    let outcome = match result {
        Ok(output) => classify(output, timeout),
        Err(e) => {
            warn!(error = %e, "failed to start program");
            ExecutionOutcome::internal_error(format!("Failed to start program: {e}"))
        }
    };

    debug!(
        classification = %outcome.classification,
        runtime_ms = outcome.runtime_ms,
        exit_code = ?outcome.exit_code,
        "execution complete"
    );

    outcome
}

/// Turn a finished process into an outcome
pub fn classify(output: ProcessOutput, timeout: Duration) -> ExecutionOutcome {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let measured_ms = output.elapsed.as_millis() as u64;

    let (classification, exit_code, runtime_ms) = match output.termination {
        Termination::TimedOut => (
            Classification::TimeLimitExceeded,
            None,
            timeout.as_millis() as u64,
        ),
        Termination::OutputLimitExceeded(_) => (Classification::RuntimeError, None, measured_ms),
        Termination::Exited { code: Some(0), .. } => {
            (Classification::Success, Some(0), measured_ms)
        }
        Termination::Exited { code, .. } => (Classification::RuntimeError, code, measured_ms),
    };

    ExecutionOutcome {
        succeeded: classification == Classification::Success,
        stdout,
        stderr,
        exit_code,
        was_killed_by_timeout: output.termination == Termination::TimedOut,
        output_limit_exceeded: matches!(output.termination, Termination::OutputLimitExceeded(_)),
        runtime_ms,
        classification,
    }
}
