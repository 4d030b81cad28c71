use arbiter::{Classification, ExecutionRequest};

use super::{fixture_source, leftover_entries, test_runner};

async fn assert_echo(language: &str, fixture: &str) {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = ExecutionRequest::new(language, fixture_source(fixture)).with_stdin("hello\n");
    let outcome = runner.execute(&request).await.expect("execution failed");

    assert_eq!(
        outcome.classification,
        Classification::Success,
        "{language}: stderr was {:?}",
        outcome.stderr
    );
    assert!(outcome.succeeded);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.stdout.trim(), "hello");
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_echo_python() {
    assert_echo("python", "echo.py").await;
}

#[tokio::test]
async fn test_echo_javascript() {
    assert_echo("javascript", "echo.js").await;
}

#[tokio::test]
async fn test_echo_java_with_renamed_class() {
    assert_echo("java", "Echo.java").await;
}

#[tokio::test]
async fn test_echo_cpp() {
    assert_echo("cpp", "echo.cpp").await;
}

#[tokio::test]
async fn test_echo_c() {
    assert_echo("c", "echo.c").await;
}

#[tokio::test]
async fn test_echo_rust() {
    assert_echo("rust", "echo.rs").await;
}

#[tokio::test]
async fn test_echo_go() {
    assert_echo("go", "echo.go").await;
}

#[tokio::test]
async fn test_language_id_is_case_insensitive() {
    assert_echo("Python", "echo.py").await;
}

#[tokio::test]
async fn test_runtime_error_reports_stderr() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = ExecutionRequest::new("python", fixture_source("crash.py"));
    let outcome = runner.execute(&request).await.unwrap();

    assert_eq!(outcome.classification, Classification::RuntimeError);
    assert!(!outcome.succeeded);
    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(outcome.error_text().as_deref(), Some("boom\n"));
}

#[tokio::test]
async fn test_program_ignoring_stdin() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = ExecutionRequest::new("python", "print('no input read')")
        .with_stdin("x".repeat(256 * 1024));
    let outcome = runner.execute(&request).await.unwrap();

    assert_eq!(outcome.classification, Classification::Success);
    assert_eq!(outcome.stdout, "no input read\n");
}
