mod common;

use axum::http::{Method, StatusCode};

use common::{response_json, response_text, TestApp};

#[tokio::test]
async fn liveness_probe_answers_ok() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response).await, "OK");
}

#[tokio::test]
async fn status_reports_service_and_database() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/status", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "dropshop-api");
    assert_eq!(body["environment"], "development");
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert!(body["paths"]["/api/v1/chat/update"].is_object());
    assert!(body["paths"]["/robokassa/result"].is_object());
}
