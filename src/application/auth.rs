//! OAuth login flow and the admin session gate.
//!
//! Sessions live entirely in HTTP-only cookies holding the identity provider's
//! access and refresh tokens. Nothing is kept in process memory between
//! requests; each gated request re-validates its token with the provider.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use url::form_urlencoded;
use uuid::Uuid;

pub const LOGIN_PATH: &str = "/auth/login";
pub const CALLBACK_PATH: &str = "/auth/callback";
pub const ERROR_PATH: &str = "/auth/error";
pub const ADMIN_PREFIX: &str = "/admin";
pub const DEFAULT_LOGIN_REDIRECT: &str = "/admin";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider rejected the credentials")]
    Unauthorized,
    #[error("identity provider request failed: {0}")]
    Transport(String),
    #[error("identity provider responded with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("identity provider returned an unexpected payload: {0}")]
    Decode(String),
    #[error("invalid identity provider url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub user: Option<AdminUser>,
}

/// GoTrue-style OAuth identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is sent to in order to start an OAuth authorization.
    fn authorize_url(
        &self,
        provider: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<String, IdentityError>;

    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<AuthTokens, IdentityError>;

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, IdentityError>;

    async fn get_user(&self, access_token: &str) -> Result<AdminUser, IdentityError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;
}

/// The authenticated session, as seen by admin handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub user: AdminUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(AdminSession),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    RedirectToLogin { location: String },
}

pub fn is_gated_path(path: &str) -> bool {
    path == ADMIN_PREFIX || path.starts_with("/admin/")
}

/// Decide what the gate does with a request for `path_and_query`.
pub fn gate_decision(path_and_query: &str, state: &SessionState) -> GateDecision {
    let path = path_and_query
        .split_once('?')
        .map_or(path_and_query, |(path, _)| path);
    match state {
        _ if !is_gated_path(path) => GateDecision::Allow,
        SessionState::Authenticated(_) => GateDecision::Allow,
        SessionState::Unauthenticated => GateDecision::RedirectToLogin {
            location: login_location(path_and_query),
        },
    }
}

/// `/auth/login?redirect=<target>` with the target percent-encoded.
pub fn login_location(target: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("redirect", target)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}

/// Keep only same-origin relative targets; anything else becomes `fallback`.
pub fn sanitize_redirect(raw: Option<&str>, fallback: &str) -> String {
    match raw.map(str::trim) {
        Some(target)
            if target.starts_with('/')
                && !target.starts_with("//")
                && !target.starts_with("/\\")
                && !target.chars().any(char::is_control) =>
        {
            target.to_string()
        }
        _ => fallback.to_string(),
    }
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let challenge = pkce_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

pub fn pkce_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize().to_vec())
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization code is missing")]
    MissingCode,
    #[error("login verifier is missing or expired")]
    MissingVerifier,
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Where to send the browser to begin a login, plus the verifier to remember.
#[derive(Debug, Clone)]
pub struct LoginStart {
    pub authorize_url: String,
    pub verifier: String,
}

/// Session validation result; `refreshed` holds new tokens when a refresh happened.
#[derive(Debug, Clone)]
pub struct SessionResolution {
    pub state: SessionState,
    pub refreshed: Option<AuthTokens>,
}

impl SessionResolution {
    fn unauthenticated() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            refreshed: None,
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
    default_provider: String,
    public_url: String,
}

impl AuthService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        default_provider: impl Into<String>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            default_provider: default_provider.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn begin_login(
        &self,
        provider: Option<&str>,
        redirect: Option<&str>,
    ) -> Result<LoginStart, AuthError> {
        let provider = provider
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.default_provider);
        let target = sanitize_redirect(redirect, DEFAULT_LOGIN_REDIRECT);
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect", &target)
            .finish();
        let callback = format!("{}{CALLBACK_PATH}?{query}", self.public_url);

        let pkce = PkcePair::generate();
        let authorize_url = self
            .identity
            .authorize_url(provider, &callback, &pkce.challenge)?;

        Ok(LoginStart {
            authorize_url,
            verifier: pkce.verifier,
        })
    }

    pub async fn complete_login(
        &self,
        code: Option<&str>,
        verifier: Option<&str>,
    ) -> Result<AuthTokens, AuthError> {
        let code = code
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AuthError::MissingCode)?;
        let verifier = verifier
            .filter(|value| !value.is_empty())
            .ok_or(AuthError::MissingVerifier)?;
        Ok(self.identity.exchange_code(code, verifier).await?)
    }

    /// Validate the cookie tokens, refreshing once when the access token is rejected.
    pub async fn resolve_session(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> SessionResolution {
        if let Some(access) = access_token {
            match self.identity.get_user(access).await {
                Ok(user) => {
                    return SessionResolution {
                        state: SessionState::Authenticated(AdminSession { user }),
                        refreshed: None,
                    };
                }
                Err(IdentityError::Unauthorized) => {
                    debug!(target = "folio::auth", "access token rejected");
                }
                Err(err) => {
                    warn!(target = "folio::auth", error = %err, "session validation failed");
                    return SessionResolution::unauthenticated();
                }
            }
        }

        let Some(refresh) = refresh_token else {
            return SessionResolution::unauthenticated();
        };

        let tokens = match self.identity.refresh(refresh).await {
            Ok(tokens) => tokens,
            Err(err) => {
                debug!(target = "folio::auth", error = %err, "session refresh failed");
                return SessionResolution::unauthenticated();
            }
        };

        let user = match tokens.user.clone() {
            Some(user) => user,
            None => match self.identity.get_user(&tokens.access_token).await {
                Ok(user) => user,
                Err(err) => {
                    warn!(target = "folio::auth", error = %err, "refreshed token rejected");
                    return SessionResolution::unauthenticated();
                }
            },
        };

        SessionResolution {
            state: SessionState::Authenticated(AdminSession { user }),
            refreshed: Some(tokens),
        }
    }

    /// Revoke the session upstream. Failures are logged; the caller clears cookies regardless.
    pub async fn logout(&self, access_token: Option<&str>) {
        let Some(token) = access_token else {
            return;
        };
        if let Err(err) = self.identity.sign_out(token).await {
            warn!(target = "folio::auth", error = %err, "provider sign-out failed");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::sync::Mutex;

    /// Accepts `good-token` and refreshes `good-refresh` into `fresh-token`.
    #[derive(Default)]
    pub(crate) struct StubIdentity {
        pub(crate) signed_out: Mutex<Vec<String>>,
        pub(crate) exchanged: Mutex<Vec<(String, String)>>,
    }

    pub(crate) fn admin_user() -> AdminUser {
        AdminUser {
            id: "user-1".to_string(),
            email: Some("author@example.com".to_string()),
        }
    }

    #[async_trait]
    impl IdentityProvider for StubIdentity {
        fn authorize_url(
            &self,
            provider: &str,
            redirect_to: &str,
            code_challenge: &str,
        ) -> Result<String, IdentityError> {
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair("provider", provider)
                .append_pair("redirect_to", redirect_to)
                .append_pair("code_challenge", code_challenge)
                .finish();
            Ok(format!("https://idp.test/authorize?{query}"))
        }

        async fn exchange_code(
            &self,
            auth_code: &str,
            code_verifier: &str,
        ) -> Result<AuthTokens, IdentityError> {
            self.exchanged
                .lock()
                .expect("lock")
                .push((auth_code.to_string(), code_verifier.to_string()));
            if auth_code == "good-code" {
                Ok(AuthTokens {
                    access_token: "good-token".to_string(),
                    refresh_token: Some("good-refresh".to_string()),
                    expires_in: Some(3600),
                    user: Some(admin_user()),
                })
            } else {
                Err(IdentityError::Rejected {
                    status: 400,
                    body: "invalid grant".to_string(),
                })
            }
        }

        async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, IdentityError> {
            if refresh_token == "good-refresh" {
                Ok(AuthTokens {
                    access_token: "fresh-token".to_string(),
                    refresh_token: Some("next-refresh".to_string()),
                    expires_in: Some(3600),
                    user: None,
                })
            } else {
                Err(IdentityError::Unauthorized)
            }
        }

        async fn get_user(&self, access_token: &str) -> Result<AdminUser, IdentityError> {
            match access_token {
                "good-token" | "fresh-token" => Ok(admin_user()),
                _ => Err(IdentityError::Unauthorized),
            }
        }

        async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
            self.signed_out
                .lock()
                .expect("lock")
                .push(access_token.to_string());
            Ok(())
        }
    }

    fn service() -> (AuthService, Arc<StubIdentity>) {
        let identity = Arc::new(StubIdentity::default());
        (
            AuthService::new(identity.clone(), "google", "https://blog.test/"),
            identity,
        )
    }

    #[test]
    fn unauthenticated_admin_requests_redirect_to_login() {
        let decision = gate_decision("/admin/write?draft=1", &SessionState::Unauthenticated);
        assert_eq!(
            decision,
            GateDecision::RedirectToLogin {
                location: "/auth/login?redirect=%2Fadmin%2Fwrite%3Fdraft%3D1".to_string()
            }
        );
    }

    #[test]
    fn authenticated_and_public_requests_pass() {
        let session = SessionState::Authenticated(AdminSession { user: admin_user() });
        assert_eq!(gate_decision("/admin", &session), GateDecision::Allow);
        assert_eq!(
            gate_decision("/en/posts/hello", &SessionState::Unauthenticated),
            GateDecision::Allow
        );
        assert_eq!(
            gate_decision("/administrator", &SessionState::Unauthenticated),
            GateDecision::Allow
        );
    }

    #[test]
    fn redirect_targets_must_be_local() {
        assert_eq!(sanitize_redirect(Some("/admin/write"), "/"), "/admin/write");
        assert_eq!(sanitize_redirect(Some("https://evil.test"), "/"), "/");
        assert_eq!(sanitize_redirect(Some("//evil.test"), "/"), "/");
        assert_eq!(sanitize_redirect(Some("/\\evil.test"), "/"), "/");
        assert_eq!(sanitize_redirect(None, "/admin"), "/admin");
    }

    #[test]
    fn pkce_challenge_matches_rfc_example() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn begin_login_defaults_provider_and_redirect() {
        let (auth, _) = service();
        let start = auth.begin_login(None, None).expect("login start");
        let url = url::Url::parse(&start.authorize_url).expect("url");
        let pairs: std::collections::HashMap<String, String> =
            url.query_pairs().into_owned().collect();

        assert_eq!(pairs["provider"], "google");
        assert_eq!(
            pairs["redirect_to"],
            "https://blog.test/auth/callback?redirect=%2Fadmin"
        );
        assert_eq!(pairs["code_challenge"], pkce_challenge(&start.verifier));
    }

    #[tokio::test]
    async fn complete_login_requires_code_and_verifier() {
        let (auth, identity) = service();
        assert!(matches!(
            auth.complete_login(None, Some("v")).await,
            Err(AuthError::MissingCode)
        ));
        assert!(matches!(
            auth.complete_login(Some("good-code"), None).await,
            Err(AuthError::MissingVerifier)
        ));

        let tokens = auth
            .complete_login(Some("good-code"), Some("verifier"))
            .await
            .expect("tokens");
        assert_eq!(tokens.access_token, "good-token");
        assert_eq!(
            identity.exchanged.lock().expect("lock").as_slice(),
            &[("good-code".to_string(), "verifier".to_string())]
        );
    }

    #[tokio::test]
    async fn rejected_access_token_is_refreshed() {
        let (auth, _) = service();
        let resolution = auth
            .resolve_session(Some("stale"), Some("good-refresh"))
            .await;
        assert!(matches!(resolution.state, SessionState::Authenticated(_)));
        assert_eq!(
            resolution.refreshed.map(|tokens| tokens.access_token),
            Some("fresh-token".to_string())
        );
    }

    #[tokio::test]
    async fn missing_or_invalid_tokens_are_unauthenticated() {
        let (auth, _) = service();
        assert_eq!(
            auth.resolve_session(None, None).await.state,
            SessionState::Unauthenticated
        );
        assert_eq!(
            auth.resolve_session(Some("stale"), Some("bad")).await.state,
            SessionState::Unauthenticated
        );
    }

    #[tokio::test]
    async fn logout_signs_out_upstream() {
        let (auth, identity) = service();
        auth.logout(Some("good-token")).await;
        auth.logout(None).await;
        assert_eq!(
            identity.signed_out.lock().expect("lock").as_slice(),
            &["good-token".to_string()]
        );
    }
}
