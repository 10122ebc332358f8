//! Audit Run Invoker: the boundary to the external browser audit engine.

pub mod chrome;
pub mod lhr;
pub mod lighthouse;
pub mod port;

use async_trait::async_trait;

use crate::model::{DeviceType, RunResult};

pub use lighthouse::LighthouseEngine;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The browser/engine process could not be started.
    #[error("{message}")]
    EngineLaunch {
        message: String,
        cause: Option<String>,
    },

    /// The engine ran but produced nothing usable.
    #[error("{message}")]
    Audit {
        message: String,
        cause: Option<String>,
    },
}

impl AuditError {
    pub fn launch(message: impl Into<String>, cause: impl ToString) -> Self {
        AuditError::EngineLaunch {
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }

    pub fn audit(message: impl Into<String>) -> Self {
        AuditError::Audit {
            message: message.into(),
            cause: None,
        }
    }

    pub fn audit_with_cause(message: impl Into<String>, cause: impl ToString) -> Self {
        AuditError::Audit {
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }

    pub fn cause(&self) -> Option<&str> {
        match self {
            AuditError::EngineLaunch { cause, .. } | AuditError::Audit { cause, .. } => {
                cause.as_deref()
            }
        }
    }

    /// Message plus cause, for job error records.
    pub fn detail(&self) -> String {
        match self.cause() {
            Some(cause) => format!("{}: {}", self, cause),
            None => self.to_string(),
        }
    }
}

/// Starts one engine instance per job.
#[async_trait]
pub trait AuditEngine: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn AuditSession>, AuditError>;
}

/// A live engine instance. Runs must not overlap, hence `&mut self`.
#[async_trait]
pub trait AuditSession: Send {
    async fn run_once(&mut self, url: &str, device: DeviceType) -> Result<RunResult, AuditError>;

    /// Release the instance. Must be safe to call more than once and must
    /// not fail; problems are logged.
    async fn close(&mut self);
}
