use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::chrome::{self, ChromeProcess};
use super::{lhr, AuditEngine, AuditError, AuditSession};
use crate::config::EngineConfig;
use crate::model::{DeviceType, RunResult};

const STDERR_TAIL_CHARS: usize = 500;

/// Runs the Lighthouse CLI against a headless Chrome owned by the session.
pub struct LighthouseEngine {
    config: EngineConfig,
}

impl LighthouseEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AuditEngine for LighthouseEngine {
    async fn launch(&self) -> Result<Box<dyn AuditSession>, AuditError> {
        let chrome = chrome::launch(&self.config).await?;
        Ok(Box::new(LighthouseSession {
            chrome,
            config: self.config.clone(),
        }))
    }
}

pub fn lighthouse_args(url: &str, device: DeviceType, port: u16) -> Vec<String> {
    let mut args = vec![
        url.to_string(),
        format!("--port={}", port),
        "--output=json".to_string(),
        "--output-path=stdout".to_string(),
        "--quiet".to_string(),
        "--only-categories=performance,accessibility,best-practices,seo".to_string(),
    ];
    if device == DeviceType::Desktop {
        args.push("--preset=desktop".to_string());
    }
    args
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let skip = trimmed.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    trimmed.chars().skip(skip).collect()
}

struct LighthouseSession {
    chrome: ChromeProcess,
    config: EngineConfig,
}

#[async_trait]
impl AuditSession for LighthouseSession {
    async fn run_once(&mut self, url: &str, device: DeviceType) -> Result<RunResult, AuditError> {
        info!("Running Lighthouse audit: url={}, device={}", url, device);

        let mut cmd = Command::new(&self.config.lighthouse_bin);
        cmd.args(lighthouse_args(url, device, self.chrome.port()))
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.config.run_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AuditError::audit_with_cause(
                    "Failed to run Lighthouse audit",
                    e,
                ))
            }
            Err(_) => {
                return Err(AuditError::audit(format!(
                    "Lighthouse audit timed out after {}s",
                    self.config.run_timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            return Err(AuditError::audit_with_cause(
                "Failed to run Lighthouse audit",
                format!("{}: {}", output.status, stderr_tail(&output.stderr)),
            ));
        }

        debug!("Lighthouse produced {} bytes of output", output.stdout.len());
        lhr::parse_run_result(&output.stdout)
    }

    async fn close(&mut self) {
        self.chrome.shutdown().await;
    }
}
