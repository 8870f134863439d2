//! Deploy-hook notification for the statically deployed copy of the site.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("deploy hook not configured")]
    NotConfigured,
    #[error("deploy hook request failed: {0}")]
    Transport(String),
    #[error("deploy hook responded with status {status}")]
    Rejected { status: u16 },
}

/// What the hook endpoint acknowledged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployReceipt {
    pub job_id: Option<String>,
}

/// Outbound call to a build-and-deploy endpoint.
#[async_trait]
pub trait DeployHook: Send + Sync {
    async fn trigger(&self) -> Result<DeployReceipt, DeployError>;
}

#[derive(Clone)]
pub struct DeployService {
    hook: Option<Arc<dyn DeployHook>>,
    webhook_secret: Option<String>,
}

impl DeployService {
    pub fn new(hook: Option<Arc<dyn DeployHook>>, webhook_secret: Option<String>) -> Self {
        Self {
            hook,
            webhook_secret,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.hook.is_some()
    }

    pub async fn trigger(&self) -> Result<DeployReceipt, DeployError> {
        let hook = self.hook.as_ref().ok_or(DeployError::NotConfigured)?;
        match hook.trigger().await {
            Ok(receipt) => {
                metrics::counter!("folio_deploy_hook_total", "outcome" => "success").increment(1);
                info!(
                    target = "folio::deploy",
                    job_id = receipt.job_id.as_deref().unwrap_or(""),
                    "deploy triggered"
                );
                Ok(receipt)
            }
            Err(err) => {
                metrics::counter!("folio_deploy_hook_total", "outcome" => "failure").increment(1);
                warn!(target = "folio::deploy", error = %err, "deploy hook failed");
                Err(err)
            }
        }
    }

    /// Whether an `Authorization` header value carries the configured webhook secret.
    ///
    /// Always `false` when no secret is configured.
    pub fn bearer_matches(&self, authorization: Option<&str>) -> bool {
        let Some(secret) = self.webhook_secret.as_deref() else {
            return false;
        };
        let Some(token) = authorization.and_then(|value| value.strip_prefix("Bearer ")) else {
            return false;
        };
        token.as_bytes().ct_eq(secret.as_bytes()).into()
    }

    pub fn has_webhook_secret(&self) -> bool {
        self.webhook_secret.is_some()
    }
}
