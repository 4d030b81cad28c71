//! Per-case results and the aggregate verdict

use std::fmt;

use serde::Serialize;

use crate::types::{Classification, ExecutionOutcome};

/// Overall status of a judged submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Success,
    PartialSuccess,
    WrongAnswer,
    TimeLimitExceeded,
    RuntimeError,
    CompilationError,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Success => "SUCCESS",
            VerdictStatus::PartialSuccess => "PARTIAL_SUCCESS",
            VerdictStatus::WrongAnswer => "WRONG_ANSWER",
            VerdictStatus::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            VerdictStatus::RuntimeError => "RUNTIME_ERROR",
            VerdictStatus::CompilationError => "COMPILATION_ERROR",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    #[serde(rename = "SUCCESS")]
    Passed,
    WrongAnswer,
    TimeLimitExceeded,
    RuntimeError,
    CompilationError,
    InternalError,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Passed => "SUCCESS",
            CaseStatus::WrongAnswer => "WRONG_ANSWER",
            CaseStatus::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            CaseStatus::RuntimeError => "RUNTIME_ERROR",
            CaseStatus::CompilationError => "COMPILATION_ERROR",
            CaseStatus::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Status of a case whose run did not succeed
    fn from_failed_run(classification: Classification) -> Self {
        match classification {
            Classification::TimeLimitExceeded => CaseStatus::TimeLimitExceeded,
            Classification::CompilationError => CaseStatus::CompilationError,
            Classification::InternalError => CaseStatus::InternalError,
            Classification::RuntimeError | Classification::Success => CaseStatus::RuntimeError,
        }
    }

    /// Overall status this case contributes when no case passed
    fn dominant(self) -> VerdictStatus {
        match self {
            CaseStatus::CompilationError => VerdictStatus::CompilationError,
            CaseStatus::TimeLimitExceeded => VerdictStatus::TimeLimitExceeded,
            CaseStatus::RuntimeError | CaseStatus::InternalError => VerdictStatus::RuntimeError,
            CaseStatus::WrongAnswer | CaseStatus::Passed => VerdictStatus::WrongAnswer,
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precedence among failures, highest wins
fn severity(status: VerdictStatus) -> u8 {
    match status {
        VerdictStatus::CompilationError => 4,
        VerdictStatus::TimeLimitExceeded => 3,
        VerdictStatus::RuntimeError => 2,
        VerdictStatus::WrongAnswer => 1,
        VerdictStatus::Success | VerdictStatus::PartialSuccess => 0,
    }
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    /// Position of the case in the submitted batch
    pub index: usize,
    pub passed: bool,
    pub status: CaseStatus,
    /// Points awarded
    pub points: u32,
    /// Points the case is worth
    pub max_points: u32,
    pub expected_output: Option<String>,
    /// Raw outcome, `None` when the case was never run
    pub outcome: Option<ExecutionOutcome>,
    pub error: Option<String>,
}

impl CaseResult {
    /// Judge the outcome of a run against the expected output
    pub fn evaluate(index: usize, expected: &str, points: u32, outcome: ExecutionOutcome) -> Self {
        let (passed, status, error) = if outcome.succeeded {
            let passed = super::compare::outputs_match(&outcome.stdout, expected);
            let status = if passed {
                CaseStatus::Passed
            } else {
                CaseStatus::WrongAnswer
            };
            (passed, status, None)
        } else {
            (
                false,
                CaseStatus::from_failed_run(outcome.classification),
                outcome.error_text(),
            )
        };

        Self {
            index,
            passed,
            status,
            points: if passed { points } else { 0 },
            max_points: points,
            expected_output: Some(expected.to_owned()),
            outcome: Some(outcome),
            error,
        }
    }

    /// A case that was not run because the submission failed to compile
    pub fn not_compiled(index: usize, expected: Option<String>, points: u32) -> Self {
        Self {
            index,
            passed: false,
            status: CaseStatus::CompilationError,
            points: 0,
            max_points: points,
            expected_output: expected,
            outcome: None,
            error: None,
        }
    }

    /// A case that could not be run because it is malformed
    pub fn internal_error(
        index: usize,
        expected: Option<String>,
        points: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            index,
            passed: false,
            status: CaseStatus::InternalError,
            points: 0,
            max_points: points,
            expected_output: expected,
            outcome: None,
            error: Some(message.into()),
        }
    }

    /// Captured stdout, empty when the case did not run
    pub fn actual_output(&self) -> &str {
        self.outcome.as_ref().map_or("", |o| o.stdout.as_str())
    }

    /// Runtime of the case in milliseconds, 0 when it did not run
    pub fn runtime_ms(&self) -> u64 {
        self.outcome.as_ref().map_or(0, |o| o.runtime_ms)
    }

    /// Whether the submitted program was actually started for this case
    pub fn ran(&self) -> bool {
        self.outcome
            .as_ref()
            .is_some_and(|o| o.classification != Classification::InternalError)
    }
}

/// Verdict of a judged submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub status: VerdictStatus,
    /// Sum of awarded points
    pub total_score: u64,
    /// Sum of all cases' points
    pub max_score: u64,
    /// One result per submitted case, in submission order
    pub cases: Vec<CaseResult>,
    /// Compiler diagnostics when the build failed
    pub compile_output: Option<String>,
}

impl JudgeVerdict {
    /// Aggregate per-case results into a verdict
    pub fn from_cases(cases: Vec<CaseResult>) -> Self {
        let status = aggregate_status(&cases);
        let total_score = cases.iter().map(|c| u64::from(c.points)).sum();
        let max_score = cases.iter().map(|c| u64::from(c.max_points)).sum();
        Self {
            status,
            total_score,
            max_score,
            cases,
            compile_output: None,
        }
    }

    /// Verdict of a submission that failed to compile
    pub fn compilation_failed(cases: Vec<CaseResult>, diagnostics: String) -> Self {
        Self {
            status: VerdictStatus::CompilationError,
            compile_output: Some(diagnostics),
            ..Self::from_cases(cases)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == VerdictStatus::Success
    }

    /// Number of passed cases
    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    /// Mean runtime over the cases that actually ran, 0 if none did
    pub fn average_runtime_ms(&self) -> u64 {
        let (count, sum) = self
            .cases
            .iter()
            .filter(|c| c.ran())
            .fold((0u64, 0u64), |(count, sum), c| (count + 1, sum + c.runtime_ms()));
        if count == 0 { 0 } else { sum / count }
    }
}

/// Overall status of a set of case results
pub fn aggregate_status(cases: &[CaseResult]) -> VerdictStatus {
    let passed = cases.iter().filter(|c| c.passed).count();
    if passed == cases.len() {
        return VerdictStatus::Success;
    }
    if passed > 0 {
        return VerdictStatus::PartialSuccess;
    }
    cases
        .iter()
        .map(|c| c.status.dominant())
        .max_by_key(|status| severity(*status))
        .unwrap_or(VerdictStatus::WrongAnswer)
}
