use arbiter::{CaseStatus, JudgeRequest, TestCase, VerdictStatus};

use super::{fixture_source, leftover_entries, test_runner};

fn addition_cases() -> Vec<TestCase> {
    vec![
        TestCase::new("1 2\n", "3\n"),
        TestCase::new("10 20\n", "30").with_points(2),
        TestCase::new("-5 5\n", "0\r\n").with_points(3),
    ]
}

#[tokio::test]
async fn test_all_cases_pass() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = JudgeRequest::new("python", fixture_source("add.py"), addition_cases());
    let verdict = runner.judge(&request).await.unwrap();

    assert_eq!(verdict.status, VerdictStatus::Success);
    assert!(verdict.is_success());
    assert_eq!(verdict.passed_count(), 3);
    assert_eq!(verdict.total_score, 6);
    assert_eq!(verdict.max_score, 6);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_partial_credit() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let mut cases = addition_cases();
    cases[1] = TestCase::new("10 20\n", "31").with_points(2);

    let request = JudgeRequest::new("python", fixture_source("add.py"), cases);
    let verdict = runner.judge(&request).await.unwrap();

    assert_eq!(verdict.status, VerdictStatus::PartialSuccess);
    assert_eq!(verdict.total_score, 4);
    assert_eq!(verdict.max_score, 6);
    let statuses: Vec<_> = verdict.cases.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![CaseStatus::Passed, CaseStatus::WrongAnswer, CaseStatus::Passed]
    );
    assert_eq!(verdict.cases[1].actual_output(), "30\n");
}

#[tokio::test]
async fn test_compile_error_fails_every_case() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = JudgeRequest::new(
        "cpp",
        fixture_source("compile_error.cpp"),
        addition_cases(),
    );
    let verdict = runner.judge(&request).await.unwrap();

    assert_eq!(verdict.status, VerdictStatus::CompilationError);
    assert_eq!(verdict.total_score, 0);
    assert_eq!(verdict.cases.len(), 3);
    assert!(verdict.cases.iter().all(|c| !c.ran()));
    assert!(verdict.compile_output.is_some_and(|d| !d.is_empty()));
}

#[tokio::test]
async fn test_time_limit_per_case() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = JudgeRequest::new(
        "python",
        fixture_source("infinite_loop.py"),
        vec![TestCase::new("", "")],
    )
    .with_timeout_ms(300);
    let verdict = runner.judge(&request).await.unwrap();

    assert_eq!(verdict.status, VerdictStatus::TimeLimitExceeded);
    assert_eq!(verdict.cases[0].status, CaseStatus::TimeLimitExceeded);
    assert_eq!(verdict.cases[0].runtime_ms(), 300);
}

#[tokio::test]
async fn test_compiled_language_compiles_once() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = JudgeRequest::new(
        "cpp",
        fixture_source("echo.cpp"),
        vec![TestCase::new("a\n", "a"), TestCase::new("b\n", "b")],
    );
    let verdict = runner.judge(&request).await.unwrap();

    assert_eq!(verdict.status, VerdictStatus::Success);
    assert_eq!(verdict.passed_count(), 2);
}
