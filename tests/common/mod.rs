#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use perf_observer::audit::{AuditEngine, AuditError, AuditSession};
use perf_observer::config::{RunSettings, WebhookConfig};
use perf_observer::model::{
    AggregatedReport, DeviceType, Job, JobId, JobRecord, JobStatus, MetricRating, MetricValue,
    Metrics, RunResult, Scores,
};
use perf_observer::orchestrator::JobOrchestrator;
use perf_observer::store::{JobStore, PersistenceError, SqliteJobStore, StatusUpdate};
use perf_observer::webhook::{HostResolver, ValidatedTarget, WebhookDispatcher, WebhookTransport};

// ============================================================================
// Audit engine
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Run(f64),
    /// Score after the session has been busy for a while.
    Slow(f64, Duration),
    Fail,
    Panic,
}

#[derive(Default)]
pub struct EngineStats {
    pub launches: AtomicUsize,
    pub runs: AtomicUsize,
    pub closes: AtomicUsize,
    pub run_times: Mutex<Vec<Instant>>,
}

impl EngineStats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct ScriptedEngine {
    steps: Vec<Step>,
    fail_launch: bool,
    pub stats: Arc<EngineStats>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            fail_launch: false,
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn scores(scores: &[f64]) -> Self {
        Self::new(scores.iter().map(|s| Step::Run(*s)).collect())
    }

    pub fn failing_launch() -> Self {
        Self {
            steps: Vec::new(),
            fail_launch: true,
            stats: Arc::new(EngineStats::default()),
        }
    }
}

#[async_trait]
impl AuditEngine for ScriptedEngine {
    async fn launch(&self) -> Result<Box<dyn AuditSession>, AuditError> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(AuditError::launch(
                "Failed to launch browser",
                "chrome binary not found",
            ));
        }
        Ok(Box::new(ScriptedSession {
            steps: self.steps.clone().into(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct ScriptedSession {
    steps: VecDeque<Step>,
    stats: Arc<EngineStats>,
}

#[async_trait]
impl AuditSession for ScriptedSession {
    async fn run_once(&mut self, _url: &str, _device: DeviceType) -> Result<RunResult, AuditError> {
        self.stats.runs.fetch_add(1, Ordering::SeqCst);
        self.stats.run_times.lock().unwrap().push(Instant::now());
        match self.steps.pop_front() {
            Some(Step::Run(score)) => Ok(run_result(score)),
            Some(Step::Slow(score, busy)) => {
                tokio::time::sleep(busy).await;
                Ok(run_result(score))
            }
            Some(Step::Panic) => panic!("engine exploded"),
            Some(Step::Fail) | None => Err(AuditError::audit("Lighthouse returned no results")),
        }
    }

    async fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn run_result(score: f64) -> RunResult {
    RunResult {
        scores: Scores {
            performance: score,
            accessibility: score,
            best_practices: score,
            seo: score,
        },
        metrics: Metrics::from_fn(|kind| MetricValue {
            value: 1000.0 * score,
            unit: kind.unit(),
            rating: MetricRating::Good,
        }),
        filmstrip: Vec::new(),
    }
}

// ============================================================================
// Webhook transport and resolver
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub at: Instant,
    pub host: String,
    pub addrs: Vec<SocketAddr>,
    pub body: Bytes,
    pub signature: Option<String>,
}

impl RecordedCall {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Answers with scripted results, then `fallback` once the script runs out.
pub struct RecordingTransport {
    script: Mutex<VecDeque<Result<u16, String>>>,
    fallback: u16,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingTransport {
    pub fn always(status: u16) -> Self {
        Self::scripted(Vec::new(), status)
    }

    pub fn scripted(script: Vec<Result<u16, String>>, fallback: u16) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn post(
        &self,
        target: &ValidatedTarget,
        body: Bytes,
        signature: Option<&str>,
    ) -> Result<u16, String> {
        self.calls.lock().unwrap().push(RecordedCall {
            at: Instant::now(),
            host: target.host.clone(),
            addrs: target.addrs.clone(),
            body,
            signature: signature.map(str::to_string),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(self.fallback))
    }
}

/// Panics on every post, after counting it.
#[derive(Default)]
pub struct PanickingTransport {
    pub posts: AtomicUsize,
}

impl PanickingTransport {
    pub fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookTransport for PanickingTransport {
    async fn post(
        &self,
        _target: &ValidatedTarget,
        _body: Bytes,
        _signature: Option<&str>,
    ) -> Result<u16, String> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        panic!("transport exploded");
    }
}

/// Resolves every host to the same fixed addresses.
pub struct StaticResolver {
    ips: Vec<IpAddr>,
}

impl StaticResolver {
    pub fn new(ips: &[&str]) -> Self {
        Self {
            ips: ips.iter().map(|ip| ip.parse().unwrap()).collect(),
        }
    }

    pub fn public() -> Self {
        Self::new(&["93.184.216.34"])
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, _host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        Ok(self.ips.iter().map(|ip| SocketAddr::new(*ip, port)).collect())
    }
}

pub fn webhook_config(max_attempts: u32, base_delay_ms: u64) -> WebhookConfig {
    WebhookConfig {
        max_attempts,
        base_delay: Duration::from_millis(base_delay_ms),
        ..WebhookConfig::default()
    }
}

pub fn dispatcher(
    config: WebhookConfig,
    transport: Arc<RecordingTransport>,
    resolver: StaticResolver,
) -> WebhookDispatcher {
    WebhookDispatcher::with_parts(config, transport, Arc::new(resolver))
}

// ============================================================================
// Store
// ============================================================================

/// In-memory store that records every status write and can be told to fail.
pub struct TestStore {
    inner: SqliteJobStore,
    pub fail_create: bool,
    pub fail_save_report: bool,
    pub history: Mutex<Vec<(JobId, JobStatus)>>,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteJobStore::open_in_memory().unwrap(),
            fail_create: false,
            fail_save_report: false,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Every status written, in order, across all jobs.
    pub fn history(&self) -> Vec<JobStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn history_for(&self, job_id: &JobId) -> Vec<JobStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

fn injected() -> PersistenceError {
    PersistenceError::Database(rusqlite::Error::InvalidQuery)
}

#[async_trait]
impl JobStore for TestStore {
    async fn create_job(&self, job: &Job) -> Result<(), PersistenceError> {
        if self.fail_create {
            return Err(injected());
        }
        self.inner.create_job(job).await?;
        self.history
            .lock()
            .unwrap()
            .push((job.id.clone(), JobStatus::Pending));
        Ok(())
    }

    async fn update_job_status(&self, update: &StatusUpdate) -> Result<(), PersistenceError> {
        self.inner.update_job_status(update).await?;
        self.history
            .lock()
            .unwrap()
            .push((update.job_id.clone(), update.status));
        Ok(())
    }

    async fn save_report(&self, report: &AggregatedReport) -> Result<String, PersistenceError> {
        if self.fail_save_report {
            return Err(injected());
        }
        self.inner.save_report(report).await
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>, PersistenceError> {
        self.inner.get_job(job_id).await
    }

    async fn get_report(
        &self,
        job_id: &JobId,
    ) -> Result<Option<AggregatedReport>, PersistenceError> {
        self.inner.get_report(job_id).await
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub fn orchestrator(
    engine: ScriptedEngine,
    store: Arc<TestStore>,
    webhooks: WebhookDispatcher,
    cooldown: Duration,
) -> Arc<JobOrchestrator> {
    Arc::new(JobOrchestrator::new(
        Arc::new(engine),
        store,
        Arc::new(webhooks),
        RunSettings {
            run_count: 3,
            cooldown,
        },
    ))
}

/// Poll the store until the job is terminal.
pub async fn wait_for_terminal(store: &dyn JobStore, job_id: &JobId) -> JobRecord {
    for _ in 0..200 {
        if let Some(record) = store.get_job(job_id).await.unwrap() {
            if record.status.is_terminal() {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached a terminal state", job_id);
}

/// Poll until `ready` holds.
pub async fn wait_until(what: &str, ready: impl Fn() -> bool) {
    for _ in 0..200 {
        if ready() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
