use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Perf Observer: runs Lighthouse audits on demand and reports back via webhook.
#[derive(Parser, Debug, Clone)]
#[command(name = "perf-observer")]
pub struct CliArgs {
    /// HTTP port to listen on
    #[arg(long = "port", env = "OBSERVER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Bearer token required on every API route except /heartbeat
    #[arg(long = "auth-token", env = "AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: String,

    /// SQLite database file for jobs and reports
    #[arg(long = "db-path", env = "OBSERVER_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Audit runs per job
    #[arg(
        long = "runs",
        env = "OBSERVER_RUNS",
        default_value_t = DEFAULT_RUN_COUNT,
        value_parser = clap::value_parser!(u32).range(1..=MAX_RUN_COUNT as i64)
    )]
    pub runs: u32,

    /// Pause between consecutive runs of one job
    #[arg(long = "run-cooldown-ms", env = "OBSERVER_RUN_COOLDOWN_MS", default_value_t = RUN_COOLDOWN_MS)]
    pub run_cooldown_ms: u64,

    /// Upper bound for a single Lighthouse run
    #[arg(long = "run-timeout-secs", env = "OBSERVER_RUN_TIMEOUT_SECS", default_value_t = RUN_TIMEOUT_SECS)]
    pub run_timeout_secs: u64,

    /// Chrome/Chromium executable
    #[arg(long = "chrome-path", env = "CHROME_PATH", default_value = DEFAULT_CHROME_PATH)]
    pub chrome_path: PathBuf,

    /// Lighthouse CLI executable
    #[arg(long = "lighthouse-bin", env = "LIGHTHOUSE_BIN", default_value = DEFAULT_LIGHTHOUSE_BIN)]
    pub lighthouse_bin: PathBuf,

    /// Webhook delivery attempts before giving up
    #[arg(
        long = "webhook-max-attempts",
        env = "WEBHOOK_RETRY_MAX_ATTEMPTS",
        default_value_t = WEBHOOK_DEFAULT_MAX_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..=10)
    )]
    pub webhook_max_attempts: u32,

    /// First webhook retry delay; doubles on every further attempt
    #[arg(
        long = "webhook-base-delay-ms",
        env = "WEBHOOK_RETRY_BASE_DELAY_MS",
        default_value_t = WEBHOOK_DEFAULT_BASE_DELAY_MS,
        value_parser = clap::value_parser!(u64).range(100..=60_000)
    )]
    pub webhook_base_delay_ms: u64,

    /// Comma-separated hostnames webhooks may be sent to (unset = any public host)
    #[arg(long = "webhook-allowed-hosts", env = "WEBHOOK_ALLOWED_HOSTS")]
    pub webhook_allowed_hosts: Option<String>,
}

// Server constants
pub const DEFAULT_PORT: u16 = 8080;

// Job constants
pub const DEFAULT_RUN_COUNT: u32 = 3;
pub const MAX_RUN_COUNT: u32 = 10;
pub const RUN_COOLDOWN_MS: u64 = 2_000;
pub const RUN_TIMEOUT_SECS: u64 = 180;

// Engine constants
pub const DEFAULT_CHROME_PATH: &str = "google-chrome";
pub const DEFAULT_LIGHTHOUSE_BIN: &str = "lighthouse";
pub const CHROME_STARTUP_TIMEOUT_SECS: u64 = 30;
pub const PORT_CHECK_INTERVAL_MS: u64 = 250;
pub const GRACEFUL_KILL_TIMEOUT_SECS: u64 = 5;

// Webhook constants
pub const WEBHOOK_DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const WEBHOOK_DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const WEBHOOK_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Observer-Signature";

/// How each job drives the audit engine.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub run_count: u32,
    pub cooldown: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            run_count: DEFAULT_RUN_COUNT,
            cooldown: Duration::from_millis(RUN_COOLDOWN_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chrome_path: PathBuf,
    pub lighthouse_bin: PathBuf,
    pub run_timeout: Duration,
    pub startup_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chrome_path: PathBuf::from(DEFAULT_CHROME_PATH),
            lighthouse_bin: PathBuf::from(DEFAULT_LIGHTHOUSE_BIN),
            run_timeout: Duration::from_secs(RUN_TIMEOUT_SECS),
            startup_timeout: Duration::from_secs(CHROME_STARTUP_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
    /// Lower-cased hostnames; `None` disables the allow-list check.
    pub allowed_hosts: Option<HashSet<String>>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: WEBHOOK_DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(WEBHOOK_DEFAULT_BASE_DELAY_MS),
            request_timeout: Duration::from_secs(WEBHOOK_REQUEST_TIMEOUT_SECS),
            allowed_hosts: None,
        }
    }
}

pub struct ObserverConfig {
    pub port: u16,
    pub auth_token: String,
    pub db_path: PathBuf,
    pub runs: RunSettings,
    pub engine: EngineConfig,
    pub webhook: WebhookConfig,
}

/// Parse a comma-separated host list. Blank entries are dropped and an
/// empty result means "no allow-list".
pub fn parse_allowed_hosts(value: Option<&str>) -> Option<HashSet<String>> {
    let hosts: HashSet<String> = value?
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if hosts.is_empty() {
        None
    } else {
        Some(hosts)
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("perf-observer")
        .join("observer.db")
}

impl ObserverConfig {
    pub fn from_args(args: CliArgs) -> Self {
        ObserverConfig {
            port: args.port,
            auth_token: args.auth_token,
            db_path: args.db_path.unwrap_or_else(default_db_path),
            runs: RunSettings {
                run_count: args.runs,
                cooldown: Duration::from_millis(args.run_cooldown_ms),
            },
            engine: EngineConfig {
                chrome_path: args.chrome_path,
                lighthouse_bin: args.lighthouse_bin,
                run_timeout: Duration::from_secs(args.run_timeout_secs),
                startup_timeout: Duration::from_secs(CHROME_STARTUP_TIMEOUT_SECS),
            },
            webhook: WebhookConfig {
                max_attempts: args.webhook_max_attempts,
                base_delay: Duration::from_millis(args.webhook_base_delay_ms),
                request_timeout: Duration::from_secs(WEBHOOK_REQUEST_TIMEOUT_SECS),
                allowed_hosts: parse_allowed_hosts(args.webhook_allowed_hosts.as_deref()),
            },
        }
    }
}
