use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};
use uuid::Uuid;

use super::port::{pick_free_port, wait_for_port};
use super::AuditError;
use crate::config::{EngineConfig, GRACEFUL_KILL_TIMEOUT_SECS};

/// A headless Chrome exposing the DevTools protocol on a loopback port.
pub struct ChromeProcess {
    child: Option<Child>,
    port: u16,
    user_data_dir: PathBuf,
}

pub fn chrome_args(port: u16, user_data_dir: &std::path::Path) -> Vec<String> {
    vec![
        "--headless=new".to_string(),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        format!("--remote-debugging-port={}", port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "about:blank".to_string(),
    ]
}

/// Fresh profile directory for one browser instance. Ports get reused, so the
/// name carries a random suffix as well.
pub fn profile_dir(port: u16) -> PathBuf {
    std::env::temp_dir().join(format!("perf-observer-chrome-{}-{}", port, Uuid::new_v4()))
}

/// Start Chrome and wait until its debugging port accepts connections.
pub async fn launch(config: &EngineConfig) -> Result<ChromeProcess, AuditError> {
    let port = pick_free_port()
        .map_err(|e| AuditError::launch("Failed to reserve a debugging port", e))?;
    let user_data_dir = profile_dir(port);

    info!(
        "Launching {:?} with debugging port {}",
        config.chrome_path, port
    );

    let child = Command::new(&config.chrome_path)
        .args(chrome_args(port, &user_data_dir))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AuditError::launch("Failed to launch browser", e))?;

    let mut chrome = ChromeProcess {
        child: Some(child),
        port,
        user_data_dir,
    };

    if !wait_for_port(port, config.startup_timeout).await {
        let exited = chrome
            .child
            .as_mut()
            .and_then(|c| c.try_wait().ok().flatten());
        let cause = match exited {
            Some(status) => format!("browser exited early with {}", status),
            None => format!(
                "debugging port {} not ready after {}s",
                port,
                config.startup_timeout.as_secs()
            ),
        };
        chrome.shutdown().await;
        return Err(AuditError::launch("Failed to launch browser", cause));
    }

    Ok(chrome)
}

impl ChromeProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Kill the browser and clean up its profile. Idempotent.
    pub async fn shutdown(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(e) = child.kill().await {
            warn!("Failed to kill browser on port {}: {}", self.port, e);
        }

        match tokio::time::timeout(
            Duration::from_secs(GRACEFUL_KILL_TIMEOUT_SECS),
            child.wait(),
        )
        .await
        {
            Ok(Ok(_)) => info!("Browser on port {} stopped", self.port),
            Ok(Err(e)) => warn!("Error waiting for browser: {}", e),
            Err(_) => warn!("Browser did not exit within timeout"),
        }

        if let Err(e) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove browser profile {:?}: {}",
                    self.user_data_dir, e
                );
            }
        }
    }
}
