use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

use super::destination::ValidatedTarget;
use crate::config::WEBHOOK_SIGNATURE_HEADER;

/// One HTTP POST attempt. Returns the response status code; any transport
/// level failure is reported as a message.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(
        &self,
        target: &ValidatedTarget,
        body: Bytes,
        signature: Option<&str>,
    ) -> Result<u16, String>;
}

pub struct ReqwestTransport {
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(
        &self,
        target: &ValidatedTarget,
        body: Bytes,
        signature: Option<&str>,
    ) -> Result<u16, String> {
        // Pin the connection to the validated addresses so a second DNS
        // answer cannot redirect delivery, and never follow redirects.
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .resolve_to_addrs(&target.host, &target.addrs)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        let mut request = client
            .post(target.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(signature) = signature {
            request = request.header(WEBHOOK_SIGNATURE_HEADER, signature);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Network error sending webhook: {}", e))?;
        Ok(response.status().as_u16())
    }
}
