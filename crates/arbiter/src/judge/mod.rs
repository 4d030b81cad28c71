//! Batch judging against weighted test cases
//!
//! A submission is written and built once, then run sequentially against
//! every test case in a single workspace.

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use crate::judge::compare::{normalize, outputs_match};
pub use crate::judge::verdict::{
    CaseResult, CaseStatus, JudgeVerdict, VerdictStatus, aggregate_status,
};

mod compare;
mod verdict;

use crate::config::{ConfigError, Language};
use crate::runner::{CompileError, CompileResult, Runner};
use crate::types::TestCase;
use crate::workspace::{Workspace, WorkspaceError};

/// A submission and the cases to judge it against
#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub language: String,
    pub source: String,
    pub test_cases: Vec<TestCase>,
    /// Run timeout per case; the language default when `None`
    pub timeout_ms: Option<u64>,
}

impl JudgeRequest {
    pub fn new(
        language: impl Into<String>,
        source: impl Into<String>,
        test_cases: Vec<TestCase>,
    ) -> Self {
        Self {
            language: language.into(),
            source: source.into(),
            test_cases,
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }
}

/// Errors that prevent a batch from being judged
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no test cases provided")]
    NoTestCases,

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

/// Judge a submission
///
/// The workspace is released exactly once, after the last case or after a
/// failed build.
#[instrument(skip(runner, request), fields(language = %request.language, cases = request.test_cases.len()))]
pub async fn judge(runner: &Runner, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
    let language = runner.resolve(&request.language)?;
    if request.test_cases.is_empty() {
        return Err(JudgeError::NoTestCases);
    }

    let workspace = runner.workspaces().acquire().await?;
    let result = judge_in(runner, &workspace, language, request).await;
    workspace.release().await;

    if let Ok(ref verdict) = result {
        info!(
            status = %verdict.status,
            score = verdict.total_score,
            max_score = verdict.max_score,
            passed = verdict.passed_count(),
            "submission judged"
        );
    }
    result
}

async fn judge_in(
    runner: &Runner,
    workspace: &Workspace,
    language: &Language,
    request: &JudgeRequest,
) -> Result<JudgeVerdict, JudgeError> {
    workspace.write_source(language, &request.source).await?;

    let command = match runner.prepare(workspace, language).await {
        Ok(CompileResult::Compiled { run_command, .. }) => run_command,
        Ok(CompileResult::Failed { diagnostics, .. }) => {
            debug!("compilation failed, skipping all cases");
            let cases = request
                .test_cases
                .iter()
                .enumerate()
                .map(|(index, case)| {
                    CaseResult::not_compiled(index, case.expected_output.clone(), case.points)
                })
                .collect();
            return Ok(JudgeVerdict::compilation_failed(cases, diagnostics));
        }
        Err(CompileError::Workspace(e)) => return Err(e.into()),
        Err(e) => {
            warn!(error = %e, "toolchain could not be started");
            let message = e.to_string();
            let cases = request
                .test_cases
                .iter()
                .enumerate()
                .map(|(index, case)| {
                    CaseResult::internal_error(
                        index,
                        case.expected_output.clone(),
                        case.points,
                        message.clone(),
                    )
                })
                .collect();
            return Ok(JudgeVerdict::from_cases(cases));
        }
    };

    let timeout = runner.effective_timeout(language, request.timeout_ms);
    let mut cases = Vec::with_capacity(request.test_cases.len());

    for (index, case) in request.test_cases.iter().enumerate() {
        let (Some(input), Some(expected)) = (&case.input, &case.expected_output) else {
            let field = case.missing_field().unwrap_or("input");
            cases.push(CaseResult::internal_error(
                index,
                case.expected_output.clone(),
                case.points,
                format!("Test case is missing '{field}'"),
            ));
            continue;
        };

        let outcome = runner
            .run(workspace, language, &command, input, timeout)
            .await;
        let result = CaseResult::evaluate(index, expected, case.points, outcome);
        debug!(index, status = %result.status, runtime_ms = result.runtime_ms(), "case judged");
        cases.push(result);
    }

    Ok(JudgeVerdict::from_cases(cases))
}
