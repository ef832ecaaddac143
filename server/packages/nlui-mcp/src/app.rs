use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nlui_error::{NluiError, ProblemDetails};
use serde::Serialize;
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;
use url::Url;
use uuid::Uuid;

use crate::adapter::{abort_pair, decode, response, PseudoRequest, RequestBody};
use crate::protocol::message::McpError;
use crate::protocol::McpServer;
use crate::store::InstanceStore;
use crate::tools::{InitSessionPrompt, InlineJsonSchemaDocs, UiRenderTool};

/// Shared handles for every route.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<InstanceStore>,
    pub mcp: Arc<McpServer>,
}

impl AppState {
    /// Wires the default tool and prompt set against `store`.
    pub fn new(store: Arc<InstanceStore>, base_url: Url) -> Self {
        let mcp = McpServer::new()
            .with_tool(UiRenderTool::new(store.clone(), base_url, &InlineJsonSchemaDocs))
            .with_prompt(InitSessionPrompt);
        Self {
            store,
            mcp: Arc::new(mcp),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    instances: usize,
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/v1/health", get(get_health))
        .route(
            "/mcp",
            post(post_mcp).get(method_not_allowed).delete(method_not_allowed),
        )
        .route("/instances", get(missing_instance_id))
        .route("/instances/", get(missing_instance_id))
        .route("/instances/:instance_id", get(get_instance))
        .with_state(Arc::new(state))
        .layer(CatchPanicLayer::custom(panic_response));

    let http_logging = match std::env::var("NLUI_LOG_HTTP") {
        Ok(value) if value == "0" || value.eq_ignore_ascii_case("false") => false,
        _ => true,
    };
    if http_logging {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|req: &Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %req.method(),
                    uri = %req.uri()
                )
            })
            .on_request(|_req: &Request<_>, span: &Span| {
                tracing::info!(parent: span, "request");
            })
            .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
                tracing::info!(
                    parent: span,
                    status = %res.status(),
                    latency_ms = latency.as_millis()
                );
            });
        router = router.layer(trace_layer);
    }

    router
}

async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        instances: state.store.len(),
    })
}

async fn post_mcp(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_body = if is_json_content_type(&headers) {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => RequestBody::Json(value),
            Err(err) => {
                tracing::debug!(error = %err, "post_mcp: body is not valid JSON; passing through");
                RequestBody::Bytes(body)
            }
        }
    } else {
        RequestBody::Text(String::from_utf8_lossy(&body).into_owned())
    };

    let mut request = PseudoRequest::build(method, uri.to_string(), headers, request_body);
    // Dropping this guard (client went away mid-call) fires the abort signal.
    let (abort, signal) = abort_pair();
    let mcp = state.mcp.clone();

    let upstream = response::build(signal, move |res| async move {
        if let Err(err) = mcp.handle_request(&mut request, res).await {
            tracing::error!(error = %err, "post_mcp: protocol engine misused response adapter");
        }
    })
    .await;

    let upstream = match upstream {
        Ok(upstream) => upstream,
        Err(err) => {
            abort.disarm();
            tracing::error!(error = %err, "post_mcp: adapter failed to produce a response");
            return problem(&NluiError::from(err));
        }
    };

    let (parts, upstream_body) = upstream.into_parts();
    let collected = axum::body::to_bytes(upstream_body, usize::MAX).await;
    abort.disarm();
    let bytes = match collected {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(error = %err, "post_mcp: failed to collect upstream body");
            return problem(&NluiError::internal(err.to_string()));
        }
    };

    let decoded = decode(&bytes);
    tracing::debug!(
        status = %parts.status,
        upstream_bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "post_mcp: reply decoded"
    );

    let mut headers = parts.headers;
    for name in [
        header::CONTENT_TYPE,
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
        header::CACHE_CONTROL,
    ] {
        headers.remove(name);
    }
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut response = Json(decoded).into_response();
    *response.status_mut() = parts.status;
    response.headers_mut().extend(headers);
    response
}

/// Stateless mode has no server-push stream and no session to tear down.
async fn method_not_allowed(method: Method) -> Response {
    tracing::info!(method = %method, "mcp: method not allowed");
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(McpError::MethodNotAllowed.to_response(Value::Null)),
    )
        .into_response()
}

async fn missing_instance_id() -> Response {
    tracing::warn!("get_instance: missing instanceId");
    problem(&NluiError::InvalidRequest {
        message: "missing instanceId parameter".to_string(),
    })
}

async fn get_instance(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
) -> Response {
    let instance_id = instance_id.trim();
    if instance_id.is_empty() {
        return missing_instance_id().await;
    }
    // Ids are stored hyphenated lowercase; other accepted spellings map onto it.
    let instance_id = match Uuid::parse_str(instance_id) {
        Ok(id) => id.to_string(),
        Err(_) => {
            tracing::warn!(instance_id, "get_instance: malformed instanceId");
            return problem(&NluiError::InvalidRequest {
                message: "malformed instanceId parameter".to_string(),
            });
        }
    };

    match state.store.get(&instance_id) {
        Some(payload) => Json(payload).into_response(),
        None => {
            tracing::warn!(instance_id = %instance_id, found = false, "get_instance: not found");
            problem(&NluiError::NotFound { instance_id })
        }
    }
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(false)
}

fn problem(err: &NluiError) -> Response {
    let problem = ProblemDetails::from(err);
    let status = StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(problem)).into_response()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("<non-string panic>");
    tracing::error!(panic = detail, "handler panicked");
    problem(&NluiError::internal(detail))
}
