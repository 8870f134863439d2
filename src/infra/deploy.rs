use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::application::deploy::{DeployError, DeployHook, DeployReceipt};

/// Calls a build-and-deploy hook URL with an empty POST.
#[derive(Clone)]
pub struct HttpDeployHook {
    client: Client,
    url: Url,
}

#[derive(Debug, Default, Deserialize)]
struct HookResponse {
    #[serde(default)]
    job: Option<HookJob>,
}

#[derive(Debug, Deserialize)]
struct HookJob {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

impl HookResponse {
    fn job_id(self) -> Option<String> {
        match self.job?.id? {
            serde_json::Value::String(id) => Some(id),
            serde_json::Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

impl HttpDeployHook {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl DeployHook for HttpDeployHook {
    async fn trigger(&self) -> Result<DeployReceipt, DeployError> {
        let response = self
            .client
            .post(self.url.clone())
            .send()
            .await
            .map_err(|err| DeployError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeployError::Rejected {
                status: status.as_u16(),
            });
        }

        // Hooks that answer with an empty or non-JSON body still count as triggered.
        let body = response
            .bytes()
            .await
            .map_err(|err| DeployError::Transport(err.to_string()))?;
        let parsed = serde_json::from_slice::<HookResponse>(&body).unwrap_or_else(|err| {
            debug!(target = "folio::deploy", error = %err, "deploy hook body was not JSON");
            HookResponse::default()
        });

        Ok(DeployReceipt {
            job_id: parsed.job_id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use httpmock::prelude::*;

    fn hook(server: &MockServer) -> HttpDeployHook {
        HttpDeployHook::new(
            Client::new(),
            Url::parse(&server.url("/hooks/deploy")).expect("url"),
        )
    }

    #[tokio::test]
    async fn returns_job_id_from_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/hooks/deploy");
                then.status(201)
                    .json_body(serde_json::json!({ "job": { "id": "dpl_123", "state": "PENDING" } }));
            })
            .await;

        let receipt = hook(&server).trigger().await.expect("triggered");
        mock.assert_async().await;
        assert_eq!(receipt.job_id.as_deref(), Some("dpl_123"));
    }

    #[tokio::test]
    async fn empty_body_has_no_job_id() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/hooks/deploy");
                then.status(200);
            })
            .await;

        let receipt = hook(&server).trigger().await.expect("triggered");
        assert_eq!(receipt.job_id, None);
    }

    #[tokio::test]
    async fn upstream_failure_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/hooks/deploy");
                then.status(503).body("unavailable");
            })
            .await;

        let err = hook(&server).trigger().await.expect_err("rejected");
        assert!(matches!(err, DeployError::Rejected { status: 503 }));
    }
}
