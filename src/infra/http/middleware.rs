use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::{
    auth::{GateDecision, SessionState, gate_decision, is_gated_path},
    error::ErrorReport,
};

use super::AuthState;
use super::auth::{read_session_tokens, store_session};

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed = start.elapsed();

    metrics::histogram!("folio_http_request_ms").record(elapsed.as_secs_f64() * 1000.0);
    metrics::counter!("folio_http_responses_total", "class" => status_class(status.as_u16()))
        .increment(1);

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = elapsed.as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "folio::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "folio::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// Admin gate: validates the session cookies and exposes the session to handlers.
///
/// Installed on the whole router so unknown `/admin/...` paths are gated too;
/// requests outside `/admin` pass straight through.
/// Rotated tokens from a refresh are written back on the way out.
pub async fn session_gate(
    State(auth): State<AuthState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !is_gated_path(request.uri().path()) {
        return next.run(request).await;
    }

    let (access, refresh) = read_session_tokens(&jar);
    let resolution = auth
        .service
        .resolve_session(access.as_deref(), refresh.as_deref())
        .await;

    let target = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    if let GateDecision::RedirectToLogin { location } = gate_decision(&target, &resolution.state) {
        debug!(target = "folio::auth", path = %target, "redirecting to login");
        return Redirect::to(&location).into_response();
    }

    if let SessionState::Authenticated(session) = resolution.state {
        request.extensions_mut().insert(session);
    }

    let response = next.run(request).await;
    match resolution.refreshed {
        Some(tokens) => (store_session(jar, &tokens, auth.cookie_secure), response).into_response(),
        None => response,
    }
}
