//! HTTP surface: axum router, multipart intake, bearer-token gate.
//!
//! Routes:
//!
//! | Method | Path | |
//! |--------|------|-|
//! | POST | `/api/extract-protocol` | multipart brain-map submission |
//! | GET  | `/api/conditions` | vocabulary and helmet keys for the manual picker |
//! | GET  | `/health` | liveness, never gated |
//!
//! Any other method on `/api/extract-protocol` gets a 405 JSON body.
//!
//! Consent is checked before anything about the file, including whether the
//! form could be read in full: a body cut off by the size limit or a broken
//! part still yields `CONSENT_REQUIRED` when no affirmative consent field
//! was read before the failure.

use crate::config::{BASELINE_HELMET, NEURORADIANT_HELMET};
use crate::error::{ErrorCode, ResolveError};
use crate::pipeline::intake::{consent_given, RawSubmission, UploadedFile};
use crate::prompts::CONDITIONS;
use crate::resolve::ProtocolService;
use crate::response::{assemble, ErrorBody};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProtocolService>,
}

/// Build the application router.
pub fn create_router(service: Arc<ProtocolService>) -> Router {
    let body_limit = service.config().max_upload_bytes;
    let token: Option<Arc<str>> = service.config().access_token.as_deref().map(Arc::from);

    // The gate wraps the method handlers only, so a wrong method is a 405
    // whether or not a token was sent.
    let gate = middleware::from_fn_with_state(token, require_bearer);
    let api = Router::new()
        .route(
            "/api/extract-protocol",
            post(extract_protocol)
                .route_layer(gate.clone())
                .fallback(method_not_allowed),
        )
        .route("/api/conditions", get(list_conditions).route_layer(gate));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(service: Arc<ProtocolService>, addr: SocketAddr) -> Result<(), ResolveError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ResolveError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!(addr = %addr, "Protocol resolver listening");

    axum::serve(listener, create_router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ResolveError::Internal(format!("Server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn extract_protocol(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let raw = match multipart {
        Ok(multipart) => {
            let limit = state.service.config().max_upload_bytes;
            let (raw, failure) = read_submission(multipart, limit).await;
            if let Some(err) = failure {
                if !consent_given(raw.consent.as_deref()) {
                    debug!("Form unreadable ({err}) and no consent before the failure");
                    return error_response(&ResolveError::ConsentRequired);
                }
                warn!("Form unreadable after consent: {err}");
                return error_response(&err);
            }
            raw
        }
        Err(rejection) => {
            debug!("Body is not multipart ({rejection}); treating as empty form");
            RawSubmission::default()
        }
    };

    let outcome = state.service.handle(raw).await;
    match &outcome {
        Ok(r) => info!(protocol_id = %r.protocol_id, "extract-protocol succeeded"),
        Err(e) if e.is_client_error() => info!(code = %e.code(), "extract-protocol rejected: {e}"),
        Err(e) => error!(code = %e.code(), "extract-protocol failed: {e}"),
    }

    let (status, body) = assemble(outcome);
    json_response(status, body)
}

async fn method_not_allowed() -> Response {
    let body = ErrorBody::new(
        ErrorCode::MethodNotAllowed,
        "Submit brain maps with POST",
        None,
    );
    let mut response = (StatusCode::METHOD_NOT_ALLOWED, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::ALLOW, header::HeaderValue::from_static("POST"));
    response
}

async fn list_conditions(State(state): State<AppState>) -> Json<Value> {
    let tables = state.service.tables();
    let conditions: Vec<&str> = CONDITIONS
        .iter()
        .copied()
        .filter(|c| tables.has_condition(c))
        .collect();
    Json(json!({
        "conditions": conditions,
        "helmet_types": [BASELINE_HELMET, NEURORADIANT_HELMET],
    }))
}

async fn require_bearer(
    State(token): State<Option<Arc<str>>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = token else {
        return next.run(request).await;
    };

    let supplied = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if supplied == Some(&*expected) {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "Rejected request without valid bearer token");
        error_response(&ResolveError::Unauthorized)
    }
}

// ---------------------------------------------------------------------------
// Multipart parsing
// ---------------------------------------------------------------------------

/// Collect the form fields the pipeline cares about.
///
/// Field names: `file`, `consent`, `condition`, `helmetType`. Unknown fields
/// are skipped. Only the first non-empty file part is kept.
///
/// Reading stops at the first multipart error. The fields read up to that
/// point are returned alongside the error so the caller can still decide on
/// consent first.
pub async fn read_submission(
    mut multipart: Multipart,
    limit: usize,
) -> (RawSubmission, Option<ResolveError>) {
    let mut raw = RawSubmission::default();
    let failure = read_fields(&mut multipart, &mut raw)
        .await
        .err()
        .map(|e| form_error(e, limit));
    (raw, failure)
}

async fn read_fields(multipart: &mut Multipart, raw: &mut RawSubmission) -> Result<(), MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "consent" => raw.consent = Some(field.text().await?),
            "condition" => raw.condition = Some(field.text().await?),
            "helmetType" => raw.helmet_type = Some(field.text().await?),
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await?;
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                if raw.file.is_some() {
                    warn!("Ignoring extra file part '{}'", filename);
                    continue;
                }
                raw.file = Some(UploadedFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            other => debug!("Ignoring form field '{}'", other),
        }
    }
    Ok(())
}

fn form_error(e: MultipartError, limit: usize) -> ResolveError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ResolveError::UploadTooLarge { limit }
    } else {
        ResolveError::Internal(format!("Malformed multipart body: {}", e.body_text()))
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

fn error_response(err: &ResolveError) -> Response {
    let body = ErrorBody::from(err);
    let status = body.status();
    json_response(status, json!(body))
}

fn json_response(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}
