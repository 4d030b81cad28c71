use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{fixture_source, test_runner};

async fn post(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_execute_endpoint() {
    let root = tempfile::tempdir().unwrap();
    let app = arbiter::router(test_runner(root.path()));

    let (status, body) = post(
        app,
        "/execute",
        json!({"language": "python", "code": fixture_source("echo.py"), "input": "hello"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(body["output"], "hello\n");
    assert_eq!(body["memory"], 0);
}

#[tokio::test]
async fn test_judge_endpoint() {
    let root = tempfile::tempdir().unwrap();
    let app = arbiter::router(test_runner(root.path()));

    let (status, body) = post(
        app,
        "/judge",
        json!({
            "language": "python",
            "code": fixture_source("add.py"),
            "testCases": [
                {"input": "1 2", "expectedOutput": "3"},
                {"input": "2 2", "expectedOutput": "5", "points": 4}
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PARTIAL_SUCCESS");
    assert_eq!(body["success"], false);
    assert_eq!(body["totalScore"], 1);
    assert_eq!(body["maxScore"], 5);
    assert_eq!(body["testCasesPassed"], 1);
    assert_eq!(body["testCaseResults"][1]["actualOutput"], "4\n");
    assert_eq!(body["testCaseResults"][1]["testCaseIndex"], 1);
}
