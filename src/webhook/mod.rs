//! Webhook notification with destination validation, HMAC signing and
//! exponential-backoff retry.
//!
//! The payload is serialized once per notification; every attempt sends the
//! same bytes with the same signature.

pub mod destination;
pub mod signature;
pub mod transport;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::WebhookConfig;
use crate::model::{DeviceType, Job, JobError, JobId, JobStatus, Summary};

pub use destination::{validate_destination, HostResolver, SystemResolver, ValidatedTarget};
pub use signature::sign_payload;
pub use transport::{ReqwestTransport, WebhookTransport};

// ============================================================================
// Error
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The URL failed validation; nothing was sent.
    #[error("{reason}")]
    DestinationRejected { url: String, reason: String },

    /// Every attempt failed or returned a non-2xx status.
    #[error("webhook delivery failed after {attempts} attempt(s): {message}")]
    Send {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("failed to sign webhook payload: {0}")]
    Signature(String),

    #[error("failed to encode webhook payload: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// Payload
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub job_id: JobId,
    pub status: JobStatus,
    pub url: String,
    pub device_type: DeviceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl WebhookPayload {
    /// Payload for a job that has reached a terminal state.
    pub fn for_job(job: &Job, summary: Option<Summary>) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            url: job.url.clone(),
            device_type: job.device_type,
            report_id: job.report_id.clone(),
            summary,
            error: job.error.clone(),
        }
    }
}

/// Outcome of a successful notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub attempts: u32,
    pub status: u16,
}

/// Delay before attempt `attempt + 1`: `base * 2^(attempt-1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct WebhookDispatcher {
    config: WebhookConfig,
    transport: Arc<dyn WebhookTransport>,
    resolver: Arc<dyn HostResolver>,
}

impl WebhookDispatcher {
    pub fn new(config: WebhookConfig) -> Self {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout));
        Self::with_parts(config, transport, Arc::new(SystemResolver))
    }

    pub fn with_parts(
        config: WebhookConfig,
        transport: Arc<dyn WebhookTransport>,
        resolver: Arc<dyn HostResolver>,
    ) -> Self {
        Self {
            config,
            transport,
            resolver,
        }
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Validate the destination, then POST the payload until a 2xx response
    /// or until the attempt budget runs out.
    pub async fn send(
        &self,
        target_url: &str,
        payload: &WebhookPayload,
        secret: Option<&str>,
    ) -> Result<Delivery, WebhookError> {
        let target = validate_destination(
            target_url,
            self.config.allowed_hosts.as_ref(),
            self.resolver.as_ref(),
        )
        .await
        .inspect_err(|e| {
            warn!(
                "Webhook destination rejected: job_id={}, reason={}",
                payload.job_id, e
            )
        })?;

        let body = Bytes::from(serde_json::to_vec(payload)?);
        let signature = match secret.filter(|s| !s.is_empty()) {
            Some(secret) => Some(sign_payload(secret, &body)?),
            None => None,
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            info!(
                "Sending webhook: job_id={}, host={}, attempt={}/{}",
                payload.job_id, target.host, attempt, max_attempts
            );

            match self
                .transport
                .post(&target, body.clone(), signature.as_deref())
                .await
            {
                Ok(status) if (200..300).contains(&status) => {
                    info!(
                        "Webhook delivered: job_id={}, status={}, attempts={}",
                        payload.job_id, status, attempt
                    );
                    return Ok(Delivery {
                        attempts: attempt,
                        status,
                    });
                }
                Ok(status) => last_error = format!("Webhook returned HTTP {}", status),
                Err(e) => last_error = e,
            }

            if attempt < max_attempts {
                let delay = backoff_delay(self.config.base_delay, attempt);
                warn!(
                    "Webhook attempt {} failed ({}), retrying in {}ms",
                    attempt,
                    last_error,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }

        error!(
            "Webhook failed after {} attempt(s): job_id={}, error={}",
            max_attempts, payload.job_id, last_error
        );
        Err(WebhookError::Send {
            url: target_url.to_string(),
            attempts: max_attempts,
            message: last_error,
        })
    }
}
