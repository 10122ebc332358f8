use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use super::{JobStore, PersistenceError, StatusUpdate};
use crate::model::{AggregatedReport, Job, JobError, JobId, JobRecord, JobStatus};

pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!("Failed to create database directory {:?}: {}", parent, e);
                }
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        store.fail_interrupted_jobs()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                device_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                completed_at TEXT,
                report_id TEXT,
                error_code TEXT,
                error_message TEXT
            );

            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL UNIQUE REFERENCES jobs(job_id) ON DELETE CASCADE,
                url TEXT NOT NULL,
                device_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                scores_json TEXT NOT NULL,
                metrics_json TEXT NOT NULL,
                runs_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at);
        ",
        )?;
        Ok(())
    }

    /// Jobs are in-process tasks, so anything still pending or running at
    /// startup belonged to a previous process and will never finish.
    fn fail_interrupted_jobs(&self) -> Result<(), PersistenceError> {
        let conn = self.conn();
        let count = conn.execute(
            "UPDATE jobs SET
                status = 'failed',
                completed_at = ?1,
                error_code = 'INTERRUPTED',
                error_message = 'Observer restarted before the job finished'
             WHERE status IN ('pending', 'running')",
            params![Utc::now()],
        )?;
        if count > 0 {
            info!("Marked {} interrupted job(s) as failed", count);
        }
        Ok(())
    }
}

fn parse_text<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn parse_json<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let error_code: Option<String> = row.get(6)?;
    let error_message: Option<String> = row.get(7)?;
    Ok(JobRecord {
        job_id: JobId::from(row.get::<_, String>(0)?),
        url: row.get(1)?,
        device_type: parse_text(row, 2)?,
        status: parse_text(row, 3)?,
        created_at: row.get(4)?,
        completed_at: row.get(5)?,
        error: error_code.map(|code| JobError {
            code,
            message: error_message.unwrap_or_default(),
        }),
        report_id: row.get(8)?,
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<AggregatedReport> {
    Ok(AggregatedReport {
        job_id: JobId::from(row.get::<_, String>(0)?),
        url: row.get(1)?,
        device_type: parse_text(row, 2)?,
        created_at: row.get(3)?,
        completed_at: row.get(4)?,
        scores: parse_json(row, 5)?,
        metrics: parse_json(row, 6)?,
        runs: parse_json(row, 7)?,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job(&self, job: &Job) -> Result<(), PersistenceError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO jobs (job_id, url, device_type, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job.id.as_str(),
                job.url,
                job.device_type.as_str(),
                JobStatus::Pending.as_str(),
                job.created_at,
            ],
        )?;
        Ok(())
    }

    async fn update_job_status(&self, update: &StatusUpdate) -> Result<(), PersistenceError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE jobs SET
                status = ?2,
                completed_at = COALESCE(?3, completed_at),
                report_id = COALESCE(?4, report_id),
                error_code = COALESCE(?5, error_code),
                error_message = COALESCE(?6, error_message)
             WHERE job_id = ?1 AND status NOT IN (?7, ?8)",
            params![
                update.job_id.as_str(),
                update.status.as_str(),
                update.completed_at,
                update.report_id,
                update.error.as_ref().map(|e| e.code.as_str()),
                update.error.as_ref().map(|e| e.message.as_str()),
                JobStatus::Completed.as_str(),
                JobStatus::Failed.as_str(),
            ],
        )?;
        if changed > 0 {
            return Ok(());
        }

        let current: Option<JobStatus> = conn
            .query_row(
                "SELECT status FROM jobs WHERE job_id = ?1",
                params![update.job_id.as_str()],
                |row| parse_text(row, 0),
            )
            .optional()?;
        match current {
            Some(status) => Err(PersistenceError::AlreadyTerminal {
                job_id: update.job_id.clone(),
                status,
            }),
            None => Err(PersistenceError::JobNotFound(update.job_id.clone())),
        }
    }

    async fn save_report(&self, report: &AggregatedReport) -> Result<String, PersistenceError> {
        let scores_json = serde_json::to_string(&report.scores)?;
        let metrics_json = serde_json::to_string(&report.metrics)?;
        let runs_json = serde_json::to_string(&report.runs)?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO reports (
                job_id, url, device_type, created_at, completed_at, scores_json, metrics_json, runs_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.job_id.as_str(),
                report.url,
                report.device_type.as_str(),
                report.created_at,
                report.completed_at,
                scores_json,
                metrics_json,
                runs_json,
            ],
        )?;
        Ok(conn.last_insert_rowid().to_string())
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>, PersistenceError> {
        let conn = self.conn();
        let job = conn
            .query_row(
                "SELECT job_id, url, device_type, status, created_at, completed_at,
                        error_code, error_message, report_id
                 FROM jobs WHERE job_id = ?1",
                params![job_id.as_str()],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    async fn get_report(
        &self,
        job_id: &JobId,
    ) -> Result<Option<AggregatedReport>, PersistenceError> {
        let conn = self.conn();
        let report = conn
            .query_row(
                "SELECT job_id, url, device_type, created_at, completed_at,
                        scores_json, metrics_json, runs_json
                 FROM reports WHERE job_id = ?1",
                params![job_id.as_str()],
                report_from_row,
            )
            .optional()?;
        Ok(report)
    }
}
