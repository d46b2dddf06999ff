//! HTTP-level tests driving the full wired stack: webhook ingestion through
//! the engine's workflows and back out through the operator APIs.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum_test::TestServer;

use crossflow_server::{App, ServerConfig};
use crossflow_webhook::providers::twilio;

const VAPI_SECRET: &str = "test-secret";
const TWILIO_TOKEN: &str = "twilio-token";
const EXTERNAL_URL: &str = "http://app.test";

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.external_url = EXTERNAL_URL.to_owned();
    config.webhook.vapi_secret = VAPI_SECRET.to_owned();
    config.webhook.twilio_auth_token = TWILIO_TOKEN.to_owned();
    config.modules.insert(
        "t1".to_owned(),
        vec!["crm".to_owned(), "hr".to_owned(), "voice".to_owned()],
    );
    config
}

fn spawn() -> (App, TestServer) {
    let app = App::build(&test_config()).expect("app should build");
    let _drain = app.start();
    let server = TestServer::new(app.router.clone()).expect("test server should start");
    (app, server)
}

fn vapi_body(event_type: &str, call_id: &str) -> String {
    serde_json::json!({
        "message": {
            "type": event_type,
            "call": {"id": call_id, "customer": {"number": "+15550001111"}},
            "transcript": "customer sounded interested, great deal ahead",
        }
    })
    .to_string()
}

#[tokio::test]
async fn health_endpoint_is_alive() {
    let (_app, server) = spawn();
    let response = server.get("/v1/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["status"], "ok");
}

#[tokio::test]
async fn webhook_without_signature_header_is_rejected() {
    let (_app, server) = spawn();
    let response = server
        .post("/v1/webhooks/voice")
        .add_query_param("tenant", "t1")
        .text(vapi_body("transcript", "c-1"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Security validation failed");
}

#[tokio::test]
async fn webhook_with_wrong_secret_is_rejected() {
    let (_app, server) = spawn();
    let response = server
        .post("/v1/webhooks/voice")
        .add_query_param("tenant", "t1")
        .add_header("x-vapi-secret", "not-the-secret")
        .text(vapi_body("transcript", "c-1"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn vapi_call_start_returns_durable_workflow_id() {
    let (_app, server) = spawn();
    let response = server
        .post("/v1/webhooks/voice")
        .add_query_param("tenant", "t1")
        .add_header("x-vapi-secret", VAPI_SECRET)
        .text(vapi_body("assistant-request", "c-7"))
        .await;

    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["success"], true);
    assert_eq!(body["workflow_id"], "voice-call-c-7");
}

#[tokio::test]
async fn call_end_runs_post_call_workflow_through_approval() {
    let (_app, server) = spawn();

    // The end-of-call report finalizes the lead and starts the post-call
    // workflow, which pauses at its approval step.
    let response = server
        .post("/v1/webhooks/voice")
        .add_query_param("tenant", "t1")
        .add_header("x-vapi-secret", VAPI_SECRET)
        .text(vapi_body("end-of-call-report", "c-9"))
        .await;

    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["success"], true);
    assert_eq!(body["lead_id"], "lead-c-9");
    assert_eq!(body["workflow_id"], "post-call-c-9");

    // The paused execution is visible through the query API.
    let response = server
        .get("/v1/executions")
        .add_query_param("tenant", "t1")
        .await;
    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    let executions = body["executions"].as_array().unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0]["status"], "paused");
    assert_eq!(executions[0]["workflow_id"], "voice-call-follow-up");
    let execution_id = executions[0]["id"].as_str().unwrap().to_owned();

    // Approving resumes and completes the follow-up.
    let response = server
        .post(&format!("/v1/executions/{execution_id}/resume"))
        .json(&serde_json::json!({"tenant": "t1", "decision": "approved"}))
        .await;
    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["execution"]["status"], "completed");
}

#[tokio::test]
async fn twilio_signed_webhook_is_accepted() {
    let (_app, server) = spawn();

    let body = "CallSid=CA77&CallStatus=completed&From=%2B15550002222&To=%2B15550003333";
    let params: BTreeMap<String, String> = serde_urlencoded::from_str(body).unwrap();
    let url = format!("{EXTERNAL_URL}/v1/webhooks/voice?tenant=t1");
    let signature = twilio::compute_signature(TWILIO_TOKEN, &url, &params);

    let response = server
        .post("/v1/webhooks/voice")
        .add_query_param("tenant", "t1")
        .add_header("x-twilio-signature", signature)
        .content_type("application/x-www-form-urlencoded")
        .text(body)
        .await;

    response.assert_status_ok();
    let response_body = response.json::<serde_json::Value>();
    assert_eq!(response_body["success"], true);
    assert_eq!(response_body["lead_id"], "lead-CA77");
}

#[tokio::test]
async fn workflows_listing_is_filtered_by_entitlements() {
    let (_app, server) = spawn();
    let response = server
        .get("/v1/workflows")
        .add_query_param("tenant", "t1")
        .await;

    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    let ids: Vec<&str> = body["workflows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"lead-to-hire"));
    assert!(ids.contains(&"voice-call-follow-up"));
    assert!(
        !ids.contains(&"invoice-chase"),
        "accounting module is not active for t1"
    );
}

#[tokio::test]
async fn unknown_tenant_has_no_workflows() {
    let (_app, server) = spawn();
    let response = server
        .get("/v1/workflows")
        .add_query_param("tenant", "nobody")
        .await;
    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    assert!(body["workflows"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn resume_unknown_execution_is_404() {
    let (_app, server) = spawn();
    let response = server
        .post("/v1/executions/no-such-id/resume")
        .json(&serde_json::json!({"tenant": "t1", "decision": "approved"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dlq_and_breakers_start_empty() {
    let (_app, server) = spawn();

    let response = server.get("/v1/dlq").await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["count"], 0);

    let response = server.get("/v1/breakers").await;
    response.assert_status_ok();
    assert!(
        response.json::<serde_json::Value>()["circuit_breakers"]
            .as_array()
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn security_failures_show_in_breaker_free_metrics() {
    let (app, server) = spawn();
    server
        .post("/v1/webhooks/voice")
        .add_query_param("tenant", "t1")
        .text(vapi_body("transcript", "c-1"))
        .await;

    assert_eq!(app.processor.security_failure_count(), 1);
    // Security failures never touch the circuit breaker.
    assert!(app.processor.breakers().statuses().is_empty());
}
