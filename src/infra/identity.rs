//! OAuth identity client for a GoTrue-compatible `/auth/v1` API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::application::auth::{AdminUser, AuthTokens, IdentityError, IdentityProvider};
use crate::infra::backend::endpoint;

#[derive(Clone)]
pub struct GoTrueIdentity {
    client: Client,
    base: Url,
    anon_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<AdminUser>,
}

impl From<TokenResponse> for AuthTokens {
    fn from(value: TokenResponse) -> Self {
        Self {
            access_token: value.access_token,
            refresh_token: value.refresh_token,
            expires_in: value.expires_in,
            user: value.user,
        }
    }
}

impl GoTrueIdentity {
    pub fn new(client: Client, base: Url, anon_key: Option<String>) -> Self {
        Self {
            client,
            base,
            anon_key,
        }
    }

    fn url(&self, path: &str) -> Result<Url, IdentityError> {
        let segments = ["auth", "v1"].into_iter().chain(path.split('/'));
        Ok(endpoint(&self.base, segments)?)
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        match self.anon_key.as_deref() {
            Some(key) => request.header("apikey", key),
            None => request,
        }
    }

    async fn token(&self, grant_type: &str, body: serde_json::Value) -> Result<AuthTokens, IdentityError> {
        let mut url = self.url("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = self
            .with_key(self.client.post(url))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let response = check(response).await?;
        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|err| IdentityError::Decode(err.to_string()))?;
        Ok(tokens.into())
    }
}

fn transport(err: reqwest::Error) -> IdentityError {
    IdentityError::Transport(err.to_string())
}

async fn check(response: Response) -> Result<Response, IdentityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(IdentityError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IdentityError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl IdentityProvider for GoTrueIdentity {
    fn authorize_url(
        &self,
        provider: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<String, IdentityError> {
        let mut url = self.url("authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "s256");
        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<AuthTokens, IdentityError> {
        self.token(
            "pkce",
            json!({ "auth_code": auth_code, "code_verifier": code_verifier }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, IdentityError> {
        self.token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn get_user(&self, access_token: &str) -> Result<AdminUser, IdentityError> {
        let response = self
            .with_key(self.client.get(self.url("user")?))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport)?;
        check(response)
            .await?
            .json()
            .await
            .map_err(|err| IdentityError::Decode(err.to_string()))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let response = self
            .with_key(self.client.post(self.url("logout")?))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport)?;
        match check(response).await {
            Ok(_) | Err(IdentityError::Unauthorized) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
