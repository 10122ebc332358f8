use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identity and enums
// ============================================================================

/// Opaque job identity handed back to the submitting caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Desktop => "desktop",
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(DeviceType::Mobile),
            "desktop" => Ok(DeviceType::Desktop),
            other => Err(format!("unknown device type '{}'", other)),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Legal edges of the job lifecycle. Terminal states have none.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Measurements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    pub performance: f64,
    pub accessibility: f64,
    pub best_practices: f64,
    pub seo: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    Ms,
    Unitless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricRating {
    Good,
    NeedsImprovement,
    Poor,
}

impl MetricRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricRating::Good => "good",
            MetricRating::NeedsImprovement => "needs-improvement",
            MetricRating::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub unit: MetricUnit,
    pub rating: MetricRating,
}

/// The six lab metrics every run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    LargestContentfulPaint,
    FirstContentfulPaint,
    CumulativeLayoutShift,
    TotalBlockingTime,
    TimeToInteractive,
    SpeedIndex,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::LargestContentfulPaint,
        MetricKind::FirstContentfulPaint,
        MetricKind::CumulativeLayoutShift,
        MetricKind::TotalBlockingTime,
        MetricKind::TimeToInteractive,
        MetricKind::SpeedIndex,
    ];

    /// Audit id used by the Lighthouse result.
    pub fn audit_id(&self) -> &'static str {
        match self {
            MetricKind::LargestContentfulPaint => "largest-contentful-paint",
            MetricKind::FirstContentfulPaint => "first-contentful-paint",
            MetricKind::CumulativeLayoutShift => "cumulative-layout-shift",
            MetricKind::TotalBlockingTime => "total-blocking-time",
            MetricKind::TimeToInteractive => "interactive",
            MetricKind::SpeedIndex => "speed-index",
        }
    }

    pub fn unit(&self) -> MetricUnit {
        match self {
            MetricKind::CumulativeLayoutShift => MetricUnit::Unitless,
            _ => MetricUnit::Ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub lcp: MetricValue,
    pub fcp: MetricValue,
    pub cls: MetricValue,
    pub tbt: MetricValue,
    pub tti: MetricValue,
    pub si: MetricValue,
}

impl Metrics {
    /// Build a metrics set by evaluating `f` once per metric kind.
    pub fn from_fn(mut f: impl FnMut(MetricKind) -> MetricValue) -> Self {
        Self {
            lcp: f(MetricKind::LargestContentfulPaint),
            fcp: f(MetricKind::FirstContentfulPaint),
            cls: f(MetricKind::CumulativeLayoutShift),
            tbt: f(MetricKind::TotalBlockingTime),
            tti: f(MetricKind::TimeToInteractive),
            si: f(MetricKind::SpeedIndex),
        }
    }

    pub fn get(&self, kind: MetricKind) -> &MetricValue {
        match kind {
            MetricKind::LargestContentfulPaint => &self.lcp,
            MetricKind::FirstContentfulPaint => &self.fcp,
            MetricKind::CumulativeLayoutShift => &self.cls,
            MetricKind::TotalBlockingTime => &self.tbt,
            MetricKind::TimeToInteractive => &self.tti,
            MetricKind::SpeedIndex => &self.si,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmstripFrame {
    pub timestamp: f64,
    pub timing: f64,
    pub data: String,
}

/// Output of a single audit engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub scores: Scores,
    pub metrics: Metrics,
    #[serde(default)]
    pub filmstrip: Vec<FilmstripFrame>,
}

/// A run as recorded in the report history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_number: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub result: RunResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub scores: Scores,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedReport {
    pub job_id: JobId,
    pub url: String,
    pub device_type: DeviceType,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub scores: Scores,
    pub metrics: Metrics,
    pub runs: Vec<RunRecord>,
}

// ============================================================================
// Jobs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Where, and with which shared secret, job notifications are delivered.
#[derive(Clone, PartialEq, Eq)]
pub struct NotificationTarget {
    pub url: String,
    pub secret: Option<String>,
}

impl fmt::Debug for NotificationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationTarget")
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// In-memory job record owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub device_type: DeviceType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub report_id: Option<String>,
    pub error: Option<JobError>,
    pub notification: Option<NotificationTarget>,
}

impl Job {
    pub fn new(
        url: impl Into<String>,
        device_type: DeviceType,
        notification: Option<NotificationTarget>,
    ) -> Self {
        Self {
            id: JobId::new(),
            url: url.into(),
            device_type,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            report_id: None,
            error: None,
            notification,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Running)
    }

    pub fn complete(&mut self, report_id: String) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        self.report_id = Some(report_id);
        Ok(())
    }

    pub fn fail(&mut self, error: JobError) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.completed_at = Some(Utc::now());
        self.error = Some(error);
        Ok(())
    }
}

/// Job row as read back from the persistence port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: JobId,
    pub url: String,
    pub device_type: DeviceType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}
