//! Configuration types.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Coordinator configuration: polling discipline and feature switches.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Delay between two status queries of a pending task.
    pub poll_interval: Duration,
    /// Consecutive transient errors after which a task is marked failed.
    pub max_transient_failures: u32,
    /// First backoff delay after a transient error (doubles per failure).
    pub backoff_base: Duration,
    /// Upper bound for the backoff delay.
    pub max_backoff: Duration,
    /// Whether the optional token swap is offered on mainnet.
    pub enable_swap: bool,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_transient_failures: 5,
            backoff_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            enable_swap: true,
            event_capacity: 256,
        }
    }
}

impl CoordinatorConfig {
    /// Read overrides from `RAIDEN_ONBOARDING_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_millis("RAIDEN_ONBOARDING_POLL_INTERVAL_MS")
                .unwrap_or(defaults.poll_interval),
            max_transient_failures: env_parse("RAIDEN_ONBOARDING_MAX_TRANSIENT_FAILURES")
                .unwrap_or(defaults.max_transient_failures),
            backoff_base: env_millis("RAIDEN_ONBOARDING_BACKOFF_BASE_MS")
                .unwrap_or(defaults.backoff_base),
            max_backoff: env_millis("RAIDEN_ONBOARDING_MAX_BACKOFF_MS")
                .unwrap_or(defaults.max_backoff),
            enable_swap: env_parse("RAIDEN_ONBOARDING_ENABLE_SWAP").unwrap_or(defaults.enable_swap),
            event_capacity: defaults.event_capacity,
        }
    }
}

/// Binary configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// JSON file holding the session constants.
    pub constants_path: PathBuf,
    /// Where downloaded keystores are written.
    pub keystore_dir: PathBuf,
    /// Timeout for each backend HTTP request.
    pub request_timeout: Duration,
    /// Optional directory for a daily rolling log file.
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = env_parse("RAIDEN_ONBOARDING_PORT").unwrap_or(5001);
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], port)),
            constants_path: std::env::var("RAIDEN_ONBOARDING_CONSTANTS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./session.json")),
            keystore_dir: std::env::var("RAIDEN_ONBOARDING_KEYSTORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./keystore")),
            request_timeout: env_millis("RAIDEN_ONBOARDING_REQUEST_TIMEOUT_MS")
                .unwrap_or(Duration::from_secs(30)),
            log_dir: std::env::var("RAIDEN_ONBOARDING_LOG_DIR").ok().map(PathBuf::from),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}
