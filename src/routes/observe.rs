use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::config::MAX_RUN_COUNT;
use crate::error::ObserverError;
use crate::model::{DeviceType, NotificationTarget};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserveRequest {
    pub url: String,
    pub device_type: DeviceType,
    pub runs: Option<u32>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl ObserveRequest {
    pub fn validate(&self) -> Result<(), ObserverError> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|_| ObserverError::InvalidRequest("url must be an absolute URL".into()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ObserverError::InvalidRequest(
                "url must be an http(s) URL with a host".into(),
            ));
        }

        if let Some(runs) = self.runs {
            if !(1..=MAX_RUN_COUNT).contains(&runs) {
                return Err(ObserverError::InvalidRequest(format!(
                    "runs must be between 1 and {}",
                    MAX_RUN_COUNT
                )));
            }
        }
        Ok(())
    }

    /// Destination validation happens at delivery time, not here.
    pub fn notification(&self) -> Option<NotificationTarget> {
        let url = self.webhook_url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        Some(NotificationTarget {
            url: url.to_string(),
            secret: self.webhook_secret.clone().filter(|s| !s.is_empty()),
        })
    }
}

pub async fn observe(
    State(state): State<SharedState>,
    body: Result<Json<ObserveRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ObserverError> {
    let Json(request) = body.map_err(|e| ObserverError::InvalidRequest(e.body_text()))?;
    request.validate()?;

    let job_id = state.orchestrator.submit(
        request.url.clone(),
        request.device_type,
        request.runs,
        request.notification(),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "data": {
                "jobId": job_id,
                "status": "pending",
            }
        })),
    ))
}
