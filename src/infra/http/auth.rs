use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use serde::Deserialize;
use time::Duration;
use tracing::{info, warn};

use crate::{
    application::auth::{
        AuthTokens, CALLBACK_PATH, DEFAULT_LOGIN_REDIRECT, ERROR_PATH, LOGIN_PATH,
        sanitize_redirect,
    },
    domain::locale::Locale,
    presentation::views::{AuthErrorTemplate, AuthErrorView, LayoutContext, render_template_response},
};

use super::{AuthState, HttpState, RouterState};

pub(crate) const ACCESS_COOKIE: &str = "folio_access_token";
pub(crate) const REFRESH_COOKIE: &str = "folio_refresh_token";
pub(crate) const VERIFIER_COOKIE: &str = "folio_pkce_verifier";

const VERIFIER_TTL: Duration = Duration::minutes(10);
const DEFAULT_ACCESS_TTL: Duration = Duration::hours(1);
const REFRESH_TTL: Duration = Duration::days(30);

pub(super) fn routes() -> Router<RouterState> {
    Router::new()
        .route(LOGIN_PATH, get(login))
        .route(CALLBACK_PATH, get(callback))
        .route(ERROR_PATH, get(auth_error))
        .route("/auth/logout", post(logout))
}

pub(crate) fn read_session_tokens(jar: &CookieJar) -> (Option<String>, Option<String>) {
    let value = |name| {
        jar.get(name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    };
    (value(ACCESS_COOKIE), value(REFRESH_COOKIE))
}

fn session_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

pub(crate) fn store_session(jar: CookieJar, tokens: &AuthTokens, secure: bool) -> CookieJar {
    let access_ttl = tokens
        .expires_in
        .filter(|seconds| *seconds > 0)
        .map(Duration::seconds)
        .unwrap_or(DEFAULT_ACCESS_TTL);
    let jar = jar.add(session_cookie(
        ACCESS_COOKIE,
        tokens.access_token.clone(),
        access_ttl,
        secure,
    ));
    match tokens.refresh_token.clone() {
        Some(refresh) => jar.add(session_cookie(REFRESH_COOKIE, refresh, REFRESH_TTL, secure)),
        None => jar,
    }
}

fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(removal(ACCESS_COOKIE))
        .remove(removal(REFRESH_COOKIE))
        .remove(removal(VERIFIER_COOKIE))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginQuery {
    provider: Option<String>,
    redirect: Option<String>,
}

async fn login(
    State(auth): State<AuthState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    match auth
        .service
        .begin_login(query.provider.as_deref(), query.redirect.as_deref())
    {
        Ok(start) => {
            let jar = jar.add(session_cookie(
                VERIFIER_COOKIE,
                start.verifier,
                VERIFIER_TTL,
                auth.cookie_secure,
            ));
            (jar, Redirect::to(&start.authorize_url)).into_response()
        }
        Err(err) => {
            warn!(target = "folio::auth", error = %err, "failed to start login");
            Redirect::to(ERROR_PATH).into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CallbackQuery {
    code: Option<String>,
    redirect: Option<String>,
    error_description: Option<String>,
}

async fn callback(
    State(auth): State<AuthState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(description) = query.error_description.as_deref() {
        warn!(target = "folio::auth", error = description, "provider reported a login error");
        return (clear_session(jar), Redirect::to(ERROR_PATH)).into_response();
    }

    let verifier = jar
        .get(VERIFIER_COOKIE)
        .map(|cookie| cookie.value().to_string());
    match auth
        .service
        .complete_login(query.code.as_deref(), verifier.as_deref())
        .await
    {
        Ok(tokens) => {
            let target = sanitize_redirect(query.redirect.as_deref(), DEFAULT_LOGIN_REDIRECT);
            info!(
                target = "folio::auth",
                user = tokens.user.as_ref().map(|user| user.id.as_str()).unwrap_or(""),
                "login completed"
            );
            let jar = store_session(jar.remove(removal(VERIFIER_COOKIE)), &tokens, auth.cookie_secure);
            (jar, Redirect::to(&target)).into_response()
        }
        Err(err) => {
            warn!(target = "folio::auth", error = %err, "login callback failed");
            (clear_session(jar), Redirect::to(ERROR_PATH)).into_response()
        }
    }
}

async fn auth_error(State(http): State<HttpState>) -> Response {
    let chrome = http
        .pages
        .chrome(Locale::DEFAULT, ERROR_PATH)
        .with_page_title("Sign-in failed");
    let content = AuthErrorView {
        message: "We could not sign you in. The login link may have expired.".to_string(),
        retry_href: LOGIN_PATH.to_string(),
    };
    render_template_response(
        AuthErrorTemplate {
            view: LayoutContext::new(chrome, content),
        },
        StatusCode::OK,
    )
}

async fn logout(State(auth): State<AuthState>, jar: CookieJar) -> Response {
    let (access, _) = read_session_tokens(&jar);
    auth.service.logout(access.as_deref()).await;
    (clear_session(jar), Redirect::to("/")).into_response()
}
