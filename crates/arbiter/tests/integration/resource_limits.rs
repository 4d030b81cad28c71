use std::time::Instant;

use arbiter::{Classification, ExecutionRequest};

use super::{fixture_source, leftover_entries, test_config, test_runner};

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request =
        ExecutionRequest::new("python", fixture_source("infinite_loop.py")).with_timeout_ms(500);
    let started = Instant::now();
    let outcome = runner.execute(&request).await.unwrap();

    assert_eq!(outcome.classification, Classification::TimeLimitExceeded);
    assert!(outcome.was_killed_by_timeout);
    assert_eq!(outcome.runtime_ms, 500);
    assert!(started.elapsed().as_secs() < 5, "process was not reaped promptly");
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_timeout_is_clamped_to_maximum() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.limits.max_run_timeout_ms = 300;
    let runner = arbiter::Runner::new(config);

    let request =
        ExecutionRequest::new("python", fixture_source("infinite_loop.py")).with_timeout_ms(60_000);
    let outcome = runner.execute(&request).await.unwrap();

    assert_eq!(outcome.classification, Classification::TimeLimitExceeded);
    assert_eq!(outcome.runtime_ms, 300);
}

#[tokio::test]
async fn test_output_flood_is_cut_off() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = ExecutionRequest::new("python", fixture_source("flood.py")).with_timeout_ms(5000);
    let outcome = runner.execute(&request).await.unwrap();

    assert_eq!(outcome.classification, Classification::RuntimeError);
    assert!(outcome.output_limit_exceeded);
    assert!(!outcome.was_killed_by_timeout);
    assert!(outcome.stdout.len() <= runner.config().limits.stdout_limit_bytes);
    assert_eq!(
        outcome.error_text().as_deref(),
        Some("Output limit exceeded")
    );
}
