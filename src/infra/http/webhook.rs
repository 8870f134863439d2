use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::post,
};
use axum_extra::extract::CookieJar;
use serde_json::json;

use crate::application::{
    auth::SessionState,
    deploy::{DeployError, DeployService},
    error::HttpError,
};

use super::auth::{read_session_tokens, store_session};
use super::{AuthState, RouterState};

const SOURCE: &str = "infra::http::webhook::deploy";

pub(super) fn routes() -> Router<RouterState> {
    Router::new().route("/api/webhooks/deploy", post(deploy))
}

/// Authorised by the webhook secret or by an admin session cookie.
async fn deploy(
    State(auth): State<AuthState>,
    State(deploy): State<DeployService>,
    mut jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if !deploy.bearer_matches(authorization) {
        let (access, refresh) = read_session_tokens(&jar);
        let resolution = auth
            .service
            .resolve_session(access.as_deref(), refresh.as_deref())
            .await;
        if !matches!(resolution.state, SessionState::Authenticated(_)) {
            return HttpError::new(
                SOURCE,
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                "no admin session or webhook secret",
            )
            .json()
            .into_response();
        }
        if let Some(tokens) = resolution.refreshed {
            jar = store_session(jar, &tokens, auth.cookie_secure);
        }
    }

    let response = match deploy.trigger().await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Deploy triggered",
                "job_id": receipt.job_id,
            })),
        )
            .into_response(),
        Err(err @ DeployError::NotConfigured) => HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Deploy hook is not configured",
            &err,
        )
        .json()
        .into_response(),
        Err(err) => HttpError::from_error(
            SOURCE,
            StatusCode::BAD_GATEWAY,
            "Failed to trigger deploy",
            &err,
        )
        .json()
        .into_response(),
    };
    (jar, response).into_response()
}
