use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::testpad::retry::RetryPolicy;

/// Testpad rounds: dashboard API and test-round duplication for Testpad.
#[derive(Parser, Debug, Clone)]
#[command(name = "testpad-rounds")]
pub struct CliArgs {
    /// HTTP port for the dashboard API
    #[arg(long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Versioned Testpad REST root
    #[arg(long = "api-base", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Where the API key is persisted between restarts
    #[arg(long = "credentials-file")]
    pub credentials_file: Option<PathBuf>,

    /// Per-request timeout; unset relies on transport defaults
    #[arg(long = "request-timeout-secs")]
    pub request_timeout_secs: Option<u64>,

    /// Attempts per Testpad call when rate limited
    #[arg(long = "max-retries", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Base delay for exponential backoff
    #[arg(long = "retry-base-delay-ms", default_value_t = DEFAULT_RETRY_BASE_DELAY_MS)]
    pub retry_base_delay_ms: u64,

    /// Scripts sampled per project for dashboard statistics
    #[arg(long = "dashboard-script-limit", default_value_t = DEFAULT_DASHBOARD_SCRIPT_LIMIT)]
    pub dashboard_script_limit: usize,

    /// Directory for daily-rolling log files
    #[arg(short = 'l', long = "log-dir")]
    pub log_dir: Option<PathBuf>,
}

pub struct DashboardConfig {
    pub port: u16,
    pub api_base: String,
    pub credentials_file: PathBuf,
    pub request_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub pacing: Pacing,
    pub dashboard_script_limit: usize,
    pub log_dir: Option<PathBuf>,
}

pub const DEFAULT_PORT: u16 = 9880;
pub const DEFAULT_API_BASE: &str = "https://api.testpad.com/api/v1";
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";
pub const APP_DIR_NAME: &str = "testpad-rounds";

// Retry constants
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

// Throttle delays inside the duplication loop, to stay under Testpad's rate limit
pub const AFTER_FOLDER_CREATE_DELAY_MS: u64 = 500;
pub const AFTER_SCRIPT_READ_DELAY_MS: u64 = 200;
pub const AFTER_SCRIPT_CREATE_DELAY_MS: u64 = 300;

// Dashboard constants
pub const DEFAULT_DASHBOARD_SCRIPT_LIMIT: usize = 10;

// Round progress fan-out
pub const ROUND_EVENT_BUFFER_SIZE: usize = 256;

/// Politeness delays between Testpad calls during a duplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacing {
    pub after_folder_create: Duration,
    pub after_script_read: Duration,
    pub after_script_create: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_folder_create: Duration::from_millis(AFTER_FOLDER_CREATE_DELAY_MS),
            after_script_read: Duration::from_millis(AFTER_SCRIPT_READ_DELAY_MS),
            after_script_create: Duration::from_millis(AFTER_SCRIPT_CREATE_DELAY_MS),
        }
    }
}

impl Pacing {
    /// No waiting at all; for tests and for APIs without rate limits.
    pub fn none() -> Self {
        Self {
            after_folder_create: Duration::ZERO,
            after_script_read: Duration::ZERO,
            after_script_create: Duration::ZERO,
        }
    }
}

/// Default persisted-key location under the platform config dir.
pub fn default_credentials_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(CREDENTIALS_FILE_NAME)
}

impl DashboardConfig {
    pub fn from_args(args: CliArgs) -> Self {
        let credentials_file = args
            .credentials_file
            .unwrap_or_else(default_credentials_file);

        DashboardConfig {
            port: args.port,
            api_base: args.api_base,
            credentials_file,
            request_timeout: args.request_timeout_secs.map(Duration::from_secs),
            retry: RetryPolicy::new(
                args.max_retries,
                Duration::from_millis(args.retry_base_delay_ms),
            ),
            pacing: Pacing::default(),
            dashboard_script_limit: args.dashboard_script_limit,
            log_dir: args.log_dir,
        }
    }
}
