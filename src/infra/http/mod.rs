//! Axum router: public pages, the OAuth flow, the gated composer and the deploy webhook.

mod admin;
mod auth;
mod middleware;
mod public;
mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::FromRef,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
};

use crate::application::{
    auth::AuthService,
    composer::PostComposer,
    content::ContentService,
    deploy::DeployService,
    error::ErrorReport,
    pages::SitePages,
    repos::RepoError,
    storage::ObjectStore,
    uploads::UploadService,
};
use crate::infra::db::{PostgresRepositories, map_sqlx_error};

use middleware::{log_responses, session_gate, set_request_context};

/// Liveness check for the database behind `/_health/db`.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> Result<(), RepoError>;
}

#[async_trait]
impl HealthCheck for PostgresRepositories {
    async fn check(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}

/// Objects served by this process when no external bucket host exists.
#[derive(Clone)]
pub struct ServedUploads {
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
}

#[derive(Clone)]
pub struct HttpState {
    pub pages: SitePages,
    pub health: Arc<dyn HealthCheck>,
    pub uploads: Option<ServedUploads>,
}

#[derive(Clone)]
pub struct AuthState {
    pub service: AuthService,
    pub cookie_secure: bool,
}

#[derive(Clone)]
pub struct AdminState {
    pub site_title: String,
    pub content: ContentService,
    pub composer: PostComposer,
    pub uploads: UploadService,
    pub deploy: DeployService,
    pub max_upload_bytes: u64,
}

#[derive(Clone)]
pub struct RouterState {
    pub http: HttpState,
    pub auth: AuthState,
    pub admin: AdminState,
}

impl FromRef<RouterState> for HttpState {
    fn from_ref(state: &RouterState) -> Self {
        state.http.clone()
    }
}

impl FromRef<RouterState> for AuthState {
    fn from_ref(state: &RouterState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<RouterState> for AdminState {
    fn from_ref(state: &RouterState) -> Self {
        state.admin.clone()
    }
}

impl FromRef<RouterState> for DeployService {
    fn from_ref(state: &RouterState) -> Self {
        state.admin.deploy.clone()
    }
}

pub fn build_router(state: RouterState) -> Router {
    let gate = axum_middleware::from_fn_with_state(state.auth.clone(), session_gate);

    Router::new()
        .merge(public::routes())
        .merge(auth::routes())
        .merge(admin::routes(state.admin.max_upload_bytes))
        .merge(webhook::routes())
        .fallback(public::fallback)
        .layer(gate)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
