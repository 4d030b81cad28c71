use arbiter::{Classification, CompileResult, ExecutionRequest};

use super::{fixture_source, leftover_entries, test_runner};

#[tokio::test]
async fn test_compile_error_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = ExecutionRequest::new("cpp", fixture_source("compile_error.cpp"));
    let outcome = runner.execute(&request).await.unwrap();

    assert_eq!(outcome.classification, Classification::CompilationError);
    assert!(!outcome.succeeded);
    assert!(outcome.stdout.is_empty());
    assert!(!outcome.stderr.is_empty(), "diagnostics should not be empty");
    assert_eq!(outcome.runtime_ms, 0);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_compile_produces_artifact() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());
    let language = runner.resolve("cpp").unwrap();

    let workspace = runner.workspaces().acquire().await.unwrap();
    workspace
        .write_source(language, &fixture_source("echo.cpp"))
        .await
        .unwrap();

    let result = runner.compile(&workspace, language).await.unwrap();
    match result {
        CompileResult::Compiled { ref run_command, .. } => {
            assert_eq!(run_command, &vec!["./solution".to_string()]);
        }
        CompileResult::Failed { ref diagnostics, .. } => {
            panic!("compilation failed: {diagnostics}")
        }
    }
    assert!(workspace.file_exists(&language.artifact_name()).await.unwrap());

    workspace.release().await;
}
