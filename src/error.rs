//! Error types for the onboarding coordinator.

use uuid::Uuid;

use crate::onboarding::state::Step;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Machine-readable kind, used in REST error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Onboarding(e) => e.kind(),
            Self::Backend(_) => "backend",
            Self::Wallet(_) => "wallet",
            Self::Exchange(_) => "exchange",
            Self::Io(_) => "io",
        }
    }
}

/// Malformed or missing session constants. Always fatal for the session.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required session constant: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Chain id {chain_id} does not belong to network {network}")]
    ChainMismatch { network: String, chain_id: u64 },

    #[error("Failed to parse session constants: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by coordinator operations.
///
/// Everything except `InvalidStep`, `UnknownAcknowledgement` and
/// `SessionClosed` is recoverable from the user's point of view.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("No wallet provider detected")]
    NoWallet,

    #[error("A {kind} task is already in progress ({id})")]
    TaskInProgress { kind: String, id: Uuid },

    #[error("Funding failed: {reason}")]
    FundingFailed { reason: String },

    #[error("Swap failed: {reason}")]
    SwapFailed { reason: String },

    #[error("Action {action} is not valid in step {step}")]
    InvalidStep { action: String, step: Step },

    #[error("Token swap is not available on {network}")]
    SwapUnavailable { network: String },

    #[error("{pending} acknowledgement(s) still pending")]
    AcknowledgementsPending { pending: usize },

    #[error("Unknown acknowledgement item: {0}")]
    UnknownAcknowledgement(String),

    #[error("Onboarding session has been shut down")]
    SessionClosed,
}

impl OnboardingError {
    /// Short machine-readable kind, used in REST error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoWallet => "no_wallet",
            Self::TaskInProgress { .. } => "task_in_progress",
            Self::FundingFailed { .. } => "funding_failed",
            Self::SwapFailed { .. } => "swap_failed",
            Self::InvalidStep { .. } => "invalid_step",
            Self::SwapUnavailable { .. } => "swap_unavailable",
            Self::AcknowledgementsPending { .. } => "acknowledgements_pending",
            Self::UnknownAcknowledgement(_) => "unknown_acknowledgement",
            Self::SessionClosed => "session_closed",
        }
    }
}

/// Backend API failures. Treated as transient while polling.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Endpoint {0} is not configured")]
    NotConfigured(String),
}

/// Wallet provider failures.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("User rejected the request")]
    Rejected,

    #[error("Wallet is connected to chain {actual}, expected {expected}")]
    WrongChain { expected: u64, actual: u64 },
}

/// Swap cost estimation failures.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("{exchange} is not listing {token}")]
    NotListed { exchange: String, token: String },

    #[error("{exchange} does not support {network}")]
    UnsupportedNetwork { exchange: String, network: String },

    #[error("Cannot calculate costs for a swap of {0}")]
    InvalidAmount(String),

    #[error("Trade not possible at the moment due to lack of liquidity")]
    NoLiquidity,

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
