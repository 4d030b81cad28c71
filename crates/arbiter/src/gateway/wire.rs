//! JSON payloads of the HTTP interface
//!
//! Request fields are all optional so that missing ones can be reported
//! with a precise 400 instead of a generic deserialization failure.

use serde::{Deserialize, Serialize};

use crate::judge::{CaseResult, JudgeVerdict};
use crate::types::{ExecutionOutcome, TestCase};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePayload {
    pub language: Option<String>,
    pub code: Option<String>,
    pub input: Option<String>,
    pub time_limit_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgePayload {
    pub language: Option<String>,
    pub code: Option<String>,
    pub test_cases: Option<Vec<TestCasePayload>>,
    pub time_limit_ms: Option<u64>,
}

/// Test case as submitted over the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCasePayload {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
}

impl From<TestCasePayload> for TestCase {
    fn from(payload: TestCasePayload) -> Self {
        Self {
            input: payload.input,
            expected_output: payload.expected_output,
            points: payload.points.unwrap_or(TestCase::DEFAULT_POINTS),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub runtime_ms: u64,
    /// Memory usage is not measured; always 0
    pub memory: u64,
    pub status: &'static str,
}

impl From<ExecutionOutcome> for ExecuteResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        let error = outcome.error_text();
        Self {
            success: outcome.succeeded,
            status: outcome.classification.as_str(),
            runtime_ms: outcome.runtime_ms,
            memory: 0,
            output: outcome.stdout,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResponse {
    pub success: bool,
    pub status: &'static str,
    pub total_score: u64,
    pub max_score: u64,
    pub test_cases_passed: usize,
    pub total_test_cases: usize,
    pub average_runtime_ms: u64,
    /// Memory usage is not measured; always 0
    pub max_memory: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub test_case_results: Vec<TestCaseResponse>,
}

impl From<JudgeVerdict> for JudgeResponse {
    fn from(verdict: JudgeVerdict) -> Self {
        let test_cases_passed = verdict.passed_count();
        let average_runtime_ms = verdict.average_runtime_ms();
        Self {
            success: verdict.is_success(),
            status: verdict.status.as_str(),
            total_score: verdict.total_score,
            max_score: verdict.max_score,
            test_cases_passed,
            total_test_cases: verdict.cases.len(),
            average_runtime_ms,
            max_memory: 0,
            error: verdict.compile_output,
            test_case_results: verdict.cases.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResponse {
    pub passed: bool,
    pub expected_output: String,
    pub actual_output: String,
    /// Points awarded
    pub points: u32,
    pub runtime_ms: u64,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub test_case_index: usize,
}

impl From<CaseResult> for TestCaseResponse {
    fn from(case: CaseResult) -> Self {
        Self {
            passed: case.passed,
            actual_output: case.actual_output().to_owned(),
            runtime_ms: case.runtime_ms(),
            status: case.status.as_str(),
            points: case.points,
            test_case_index: case.index,
            expected_output: case.expected_output.unwrap_or_default(),
            error: case.error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub supported_languages: Vec<String>,
    /// Seconds since the gateway started
    pub uptime: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageResponse {
    pub id: String,
    pub display_name: String,
    pub extension: String,
    pub default_timeout_ms: u64,
}

/// Body of every non-200 response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub status: &'static str,
    pub error: String,
}
