use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use nlui_mcp::{build_router, AppState, InstanceStore};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use url::Url;

struct TestApp {
    app: Router,
    store: Arc<InstanceStore>,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(InstanceStore::new());
        let base_url = Url::parse("http://localhost:5173").expect("base url");
        let app = build_router(AppState::new(store.clone(), base_url));
        Self { app, store }
    }
}

async fn send_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Body>,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(body.unwrap_or_else(Body::empty))
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request handled");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    (status, headers, bytes.to_vec())
}

async fn send_json(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let (status, _, bytes) = send_request(app, method, uri, None, &[]).await;
    let payload = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, payload)
}

async fn post_mcp(app: &Router, message: Value, accept: &str) -> (StatusCode, HeaderMap, Value) {
    let (status, headers, bytes) = send_request(
        app,
        Method::POST,
        "/mcp",
        Some(Body::from(message.to_string())),
        &[
            (header::CONTENT_TYPE.as_str(), "application/json"),
            (header::ACCEPT.as_str(), accept),
        ],
    )
    .await;
    let payload = serde_json::from_slice(&bytes).expect("decoded events");
    (status, headers, payload)
}

fn only_event(payload: &Value) -> &Value {
    let events = payload["events"].as_array().expect("events array");
    assert_eq!(events.len(), 1, "expected one event: {payload}");
    assert_eq!(events[0]["event"], "message");
    &events[0]["data"]
}

const SSE_ACCEPT: &str = "application/json, text/event-stream";

#[tokio::test]
async fn health_reports_instance_count() {
    let test_app = TestApp::new();
    test_app.store.put(json!({"block": {}}));

    let (status, payload) = send_json(&test_app.app, Method::GET, "/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload, json!({"ok": true, "instances": 1}));
}

#[tokio::test]
async fn stored_instance_round_trips_through_retrieval() {
    let test_app = TestApp::new();
    let document = json!({"block": {"main": {"kind": "card"}}});
    let id = test_app.store.put(document.clone());

    let (status, payload) =
        send_json(&test_app.app, Method::GET, &format!("/instances/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload, document);

    let other = uuid::Uuid::new_v4();
    let (status, payload) =
        send_json(&test_app.app, Method::GET, &format!("/instances/{other}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload["status"], 404);
    assert_eq!(payload["type"], "urn:nlui:error:not_found");
    assert!(payload.get("block").is_none());
}

#[tokio::test]
async fn alternate_uuid_spellings_resolve_to_stored_instance() {
    let test_app = TestApp::new();
    let document = json!({"block": {"main": {"kind": "alert"}}});
    let id = test_app.store.put(document.clone());
    let parsed = uuid::Uuid::parse_str(&id).expect("stored id is a uuid");

    for spelling in [
        id.to_uppercase(),
        parsed.urn().to_string(),
        parsed.simple().to_string(),
    ] {
        let (status, payload) =
            send_json(&test_app.app, Method::GET, &format!("/instances/{spelling}")).await;
        assert_eq!(status, StatusCode::OK, "{spelling}");
        assert_eq!(payload, document, "{spelling}");
    }
}

#[tokio::test]
async fn malformed_or_missing_instance_id_is_bad_request() {
    let test_app = TestApp::new();

    for uri in ["/instances/not-a-uuid", "/instances", "/instances/"] {
        let (status, payload) = send_json(&test_app.app, Method::GET, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(payload["status"], 400, "{uri}");
    }
}

#[tokio::test]
async fn non_post_mcp_is_method_not_allowed() {
    let test_app = TestApp::new();

    for method in [Method::GET, Method::DELETE] {
        let (status, payload) = send_json(&test_app.app, method.clone(), "/mcp").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
        assert_eq!(
            payload,
            json!({
                "jsonrpc": "2.0",
                "error": {"code": -32000, "message": "Method not allowed."},
                "id": null
            })
        );
    }
}

#[tokio::test]
async fn initialize_over_sse_is_decoded_to_events() {
    let test_app = TestApp::new();
    let (status, headers, payload) = post_mcp(
        &test_app.app,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0.0.0"}
            }
        }),
        SSE_ACCEPT,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("application/json")
    );
    let reply = only_event(&payload);
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(reply["result"]["serverInfo"]["name"], "nlui-mcp-server");
}

#[tokio::test]
async fn plain_json_reply_is_a_single_message_event() {
    let test_app = TestApp::new();
    let (status, _, payload) = post_mcp(
        &test_app.app,
        json!({"jsonrpc": "2.0", "id": "list", "method": "tools/list"}),
        "application/json",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let reply = only_event(&payload);
    let tools = reply["result"]["tools"].as_array().expect("tools");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "ui-render");
    assert_eq!(tools[0]["inputSchema"]["type"], "object");
}

#[tokio::test]
async fn ui_render_call_stores_instance_for_retrieval() {
    let test_app = TestApp::new();
    let arguments = json!({"block": {"main": {"kind": "card"}}, "showTools": false});
    let (status, _, payload) = post_mcp(
        &test_app.app,
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "ui-render", "arguments": arguments}
        }),
        SSE_ACCEPT,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let result = &only_event(&payload)["result"];
    assert!(result.get("isError").is_none());
    let resource = &result["content"][0]["resource"];
    assert_eq!(result["content"][0]["type"], "resource");
    assert_eq!(resource["mimeType"], "text/html");

    let uri = Url::parse(resource["uri"].as_str().expect("uri")).expect("reference url");
    assert_eq!(uri.host_str(), Some("localhost"));
    let (_, instance_id) = uri
        .query_pairs()
        .find(|(key, _)| key == "instanceId")
        .expect("instanceId query");

    let (status, stored) = send_json(
        &test_app.app,
        Method::GET,
        &format!("/instances/{instance_id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored, arguments);
}

#[tokio::test]
async fn invalid_ui_render_arguments_return_error_result() {
    let test_app = TestApp::new();
    let (status, _, payload) = post_mcp(
        &test_app.app,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "ui-render", "arguments": {}}
        }),
        SSE_ACCEPT,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let result = &only_event(&payload)["result"];
    assert_eq!(result["isError"], true);
    let failure: Value =
        serde_json::from_str(result["content"][0]["text"].as_str().expect("text"))
            .expect("failure json");
    assert_eq!(failure["type"], "error");
    assert!(test_app.store.is_empty());
}

#[tokio::test]
async fn notification_is_accepted_without_events() {
    let test_app = TestApp::new();
    let (status, _, payload) = post_mcp(
        &test_app.app,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        SSE_ACCEPT,
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(payload, json!({"events": []}));
}

#[tokio::test]
async fn malformed_json_is_a_parse_error() {
    let test_app = TestApp::new();
    let (status, _, bytes) = send_request(
        &test_app.app,
        Method::POST,
        "/mcp",
        Some(Body::from("{not json")),
        &[(header::CONTENT_TYPE.as_str(), "application/json")],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let payload: Value = serde_json::from_slice(&bytes).expect("decoded events");
    let reply = only_event(&payload);
    assert_eq!(reply["error"]["code"], -32700);
    assert_eq!(reply["id"], Value::Null);
}

#[tokio::test]
async fn init_session_prompt_is_listed_and_served() {
    let test_app = TestApp::new();
    let (_, _, payload) = post_mcp(
        &test_app.app,
        json!([
            {"jsonrpc": "2.0", "id": 1, "method": "prompts/list"},
            {
                "jsonrpc": "2.0",
                "id": 2,
                "method": "prompts/get",
                "params": {"name": "init-session", "arguments": {"language": "fr"}}
            }
        ]),
        "application/json",
    )
    .await;

    let replies = only_event(&payload).as_array().expect("batch reply");
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["result"]["prompts"][0]["name"], "init-session");
    let message = &replies[1]["result"]["messages"][0];
    assert_eq!(message["role"], "user");
    assert!(message["content"]["text"]
        .as_str()
        .expect("prompt text")
        .contains("ui-render"));
}
