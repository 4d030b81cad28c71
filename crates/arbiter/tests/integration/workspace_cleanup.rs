use std::time::Duration;

use arbiter::{ExecutionRequest, WorkspaceManager};
use uuid::Uuid;

use super::{fixture_source, leftover_entries, test_runner};

#[tokio::test]
async fn test_no_workspace_left_after_concurrent_executions() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let mut handles = Vec::new();
    for i in 0..16 {
        let runner = runner.clone();
        handles.push(tokio::spawn(async move {
            let request = ExecutionRequest::new("python", fixture_source("echo.py"))
                .with_stdin(format!("{i}\n"));
            runner.execute(&request).await.unwrap()
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.stdout.trim(), i.to_string());
    }

    assert_eq!(leftover_entries(root.path()), 0);
    assert_eq!(
        runner.workspaces().available(),
        runner.workspaces().capacity()
    );
}

#[tokio::test]
async fn test_sweep_removes_orphans() {
    let root = tempfile::tempdir().unwrap();
    let orphan = root.path().join(Uuid::new_v4().to_string());
    std::fs::create_dir_all(&orphan).unwrap();
    std::fs::write(orphan.join("solution.py"), "print(1)").unwrap();

    let manager = WorkspaceManager::new(root.path(), 1, Duration::ZERO);
    let report = manager.sweep().await.unwrap();

    assert_eq!(report.removed, 1);
    assert!(!orphan.exists());
}
