//! External collaborators of the coordinator.
//!
//! - `OnboardingBackend`: installer backend (gas price, keystore,
//!   configuration detail, swap)
//! - `FaucetService`: test-network ETH dispenser
//! - `WalletProvider`: optional injected signer
//! - `http`: reqwest implementations of the backend and faucet

pub mod http;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, WalletError};
use crate::onboarding::model::Network;
use crate::onboarding::task::TaskStatus;

pub use http::HttpBackend;

/// Account configuration as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationDetail {
    /// Confirmed on-chain ETH balance of the account.
    pub eth_balance_wei: U256,
    /// Set when the backend knows the funding transaction failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl ConfigurationDetail {
    /// Funding is only confirmed once the balance covers the required amount.
    pub fn funding_status(&self, required_wei: U256) -> TaskStatusReport {
        if self.eth_balance_wei >= required_wei {
            return TaskStatusReport::succeeded();
        }
        match &self.funding_error {
            Some(reason) => TaskStatusReport::failed(reason.clone()),
            None => TaskStatusReport::pending(),
        }
    }
}

/// Status of a task as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusReport {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TaskStatusReport {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            reason: None,
        }
    }

    pub fn succeeded() -> Self {
        Self {
            status: TaskStatus::Succeeded,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            reason: Some(reason.into()),
        }
    }
}

/// Swap quote as computed by the backend for a token purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapQuote {
    pub exchange: String,
    pub token: String,
    pub token_amount: Decimal,
    /// Price of one token in ETH.
    pub exchange_rate: Decimal,
    pub gas_estimate: u64,
    pub gas_price_wei: U256,
    /// Gas price ceiling enforced by the exchange contract (Kyber's `maxGasPrice`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gas_price_wei: Option<U256>,
    pub block_gas_limit: u64,
    /// Whether the exchange lists `token` at all.
    #[serde(default = "default_listed")]
    pub listed: bool,
}

fn default_listed() -> bool {
    true
}

/// Swap execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    pub account: Address,
    pub token: String,
    pub amount: Decimal,
}

/// Installer backend API.
#[async_trait]
pub trait OnboardingBackend: Send + Sync {
    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<U256, BackendError>;

    /// Raw keystore file of the account.
    async fn keystore(&self) -> Result<Vec<u8>, BackendError>;

    /// Current account configuration, including its confirmed balance.
    async fn configuration_detail(&self) -> Result<ConfigurationDetail, BackendError>;

    async fn swap_quote(&self, token: &str, amount: Decimal) -> Result<SwapQuote, BackendError>;

    /// Start a swap. Returns the backend's swap identifier.
    async fn submit_swap(&self, request: &SwapRequest) -> Result<String, BackendError>;

    async fn swap_status(&self, reference: &str) -> Result<TaskStatusReport, BackendError>;
}

/// Test-network faucet.
#[async_trait]
pub trait FaucetService: Send + Sync {
    /// Ask for funds to be sent to `address`. Returns a request reference.
    async fn request_funds(
        &self,
        address: Address,
        network: Network,
    ) -> Result<String, BackendError>;
}

/// Transaction submitted through a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas_price: U256,
}

/// Browser-injected signer. The coordinator holds `Option<Arc<dyn WalletProvider>>`,
/// so absence is a plain `None`.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn chain_id(&self) -> Result<u64, WalletError>;

    async fn request_account(&self) -> Result<Address, WalletError>;

    /// Sign and submit `tx`. Returns the transaction hash.
    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<String, WalletError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(balance: u64, error: Option<&str>) -> ConfigurationDetail {
        ConfigurationDetail {
            eth_balance_wei: U256::from(balance),
            funding_error: error.map(String::from),
            network: None,
        }
    }

    #[test]
    fn funding_status_requires_full_balance() {
        let required = U256::from(100u64);
        assert_eq!(detail(99, None).funding_status(required).status, TaskStatus::Pending);
        assert_eq!(detail(100, None).funding_status(required).status, TaskStatus::Succeeded);
        assert_eq!(detail(500, None).funding_status(required).status, TaskStatus::Succeeded);
    }

    #[test]
    fn funding_error_fails_only_while_underfunded() {
        let required = U256::from(100u64);
        let report = detail(10, Some("tx reverted")).funding_status(required);
        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(report.reason.as_deref(), Some("tx reverted"));

        let report = detail(100, Some("stale error")).funding_status(required);
        assert_eq!(report.status, TaskStatus::Succeeded);
    }

    #[test]
    fn status_report_serde() {
        let report: TaskStatusReport =
            serde_json::from_str(r#"{"status": "failed", "reason": "slippage"}"#).unwrap();
        assert_eq!(report, TaskStatusReport::failed("slippage"));

        let report: TaskStatusReport = serde_json::from_str(r#"{"status": "pending"}"#).unwrap();
        assert_eq!(report, TaskStatusReport::pending());
    }
}
