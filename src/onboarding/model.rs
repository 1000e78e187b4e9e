//! Session constants and the immutable onboarding session built from them.

use std::str::FromStr;
use std::sync::LazyLock;

use alloy_primitives::{Address, U256};
use regex::Regex;
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of decimals of ETH.
pub const ETH_DECIMALS: u32 = 18;

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([0-9]+(?:\.[0-9]+)?)\s*(?:eth)?\s*$").expect("valid amount regex")
});

/// Ethereum networks the installer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Ropsten,
    Rinkeby,
    Goerli,
    Kovan,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Self::Mainnet,
        Self::Ropsten,
        Self::Rinkeby,
        Self::Goerli,
        Self::Kovan,
    ];

    pub fn chain_id(&self) -> u64 {
        match self {
            Self::Mainnet => 1,
            Self::Ropsten => 3,
            Self::Rinkeby => 4,
            Self::Goerli => 5,
            Self::Kovan => 42,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Ropsten => "ropsten",
            Self::Rinkeby => "rinkeby",
            Self::Goerli => "goerli",
            Self::Kovan => "kovan",
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.chain_id() == chain_id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|n| n.name().eq_ignore_ascii_case(name))
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(self, Self::Mainnet)
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An ETH amount in both human and raw (wei) form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EthAmount {
    pub value: Decimal,
    pub wei: U256,
}

impl EthAmount {
    /// Parse a human-formatted amount such as `"0.125 ETH"` or `"0.125"`.
    pub fn parse(input: &str) -> Option<Self> {
        let caps = AMOUNT_RE.captures(input)?;
        let value = Decimal::from_str(caps.get(1)?.as_str()).ok()?;
        let wei = decimal_to_wei(value)?;
        Some(Self { value, wei })
    }

    pub fn from_wei(wei: U256) -> Option<Self> {
        let raw = u128::try_from(wei).ok()?;
        let raw = i128::try_from(raw).ok()?;
        let value = Decimal::try_from_i128_with_scale(raw, ETH_DECIMALS).ok()?;
        Some(Self {
            value: value.normalize(),
            wei,
        })
    }

    /// Human-readable form, e.g. `0.125 ETH`.
    pub fn formatted(&self) -> String {
        format!("{} ETH", self.value.normalize())
    }
}

impl std::fmt::Display for EthAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.formatted())
    }
}

/// Convert an ETH decimal into wei. Rejects negatives and sub-wei precision.
pub fn decimal_to_wei(value: Decimal) -> Option<U256> {
    if value.is_sign_negative() || value.scale() > ETH_DECIMALS {
        return None;
    }
    let mantissa = u128::try_from(value.mantissa()).ok()?;
    let mut wei = U256::from(mantissa);
    for _ in value.scale()..ETH_DECIMALS {
        wei = wei.checked_mul(U256::from(10u8))?;
    }
    Some(wei)
}

/// Endpoint URLs as embedded in the page. Empty strings mean "not available".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConstants {
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub keystore: String,
    #[serde(default)]
    pub configuration_detail: String,
    #[serde(default)]
    pub swap: String,
    #[serde(default)]
    pub faucet: String,
}

/// Constants the server embeds in the onboarding page.
///
/// Everything is string-encoded, exactly like the template renders it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConstants {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub required_amount: Option<String>,
    #[serde(default)]
    pub required_amount_raw: Option<String>,
    #[serde(default)]
    pub faucet_available: Option<String>,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub configuration_file: Option<String>,
    #[serde(default)]
    pub urls: EndpointConstants,
    #[serde(default)]
    pub acknowledgements: Vec<String>,
}

/// Validated endpoint URLs.
#[derive(Debug, Clone)]
pub struct EndpointUrls {
    pub gas_price: Url,
    pub keystore: Url,
    pub configuration_detail: Url,
    pub swap: Option<Url>,
    pub faucet: Option<Url>,
}

/// One in-progress account setup. Immutable once built.
#[derive(Debug, Clone)]
pub struct OnboardingSession {
    pub address: Address,
    pub configuration_file: String,
    pub chain_id: u64,
    pub network: Network,
    pub faucet_available: bool,
    pub required_amount: EthAmount,
    pub urls: EndpointUrls,
    pub acknowledgements: Vec<String>,
}

impl SessionConstants {
    /// Load constants from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate the constants and build the session.
    pub fn into_session(self) -> Result<OnboardingSession, ConfigError> {
        let address_raw = required(&self.address, "address")?;
        let address = Address::parse_checksummed(address_raw, None)
            .map_err(|e| ConfigError::invalid("address", format!("{address_raw}: {e}")))?;

        let network_raw = required(&self.network, "network")?;
        let network = Network::from_name(network_raw)
            .ok_or_else(|| {
                ConfigError::invalid("network", format!("unknown network {network_raw}"))
            })?;

        let chain_id_raw = required(&self.chain_id, "chain_id")?;
        let chain_id: u64 = chain_id_raw
            .trim()
            .parse()
            .map_err(|_| {
                ConfigError::invalid("chain_id", format!("not a number: {chain_id_raw}"))
            })?;
        if network.chain_id() != chain_id {
            return Err(ConfigError::ChainMismatch {
                network: network.to_string(),
                chain_id,
            });
        }

        let faucet_available = parse_flag(required(&self.faucet_available, "faucet_available")?)
            .ok_or_else(|| ConfigError::invalid("faucet_available", "expected true or false"))?;

        let amount_raw = required(&self.required_amount, "required_amount")?;
        let mut required_amount = EthAmount::parse(amount_raw)
            .ok_or_else(|| {
                ConfigError::invalid("required_amount", format!("cannot parse {amount_raw}"))
            })?;
        if let Some(raw) = self.required_amount_raw.as_deref().filter(|s| !s.trim().is_empty()) {
            let wei = U256::from_str_radix(raw.trim(), 10)
                .map_err(|e| ConfigError::invalid("required_amount_raw", e.to_string()))?;
            required_amount.wei = wei;
        }
        if required_amount.wei.is_zero() {
            return Err(ConfigError::invalid("required_amount", "must be greater than zero"));
        }

        let configuration_file =
            required(&self.configuration_file, "configuration_file")?.to_string();

        let urls = EndpointUrls {
            gas_price: required_url(&self.urls.gas_price, "urls.gas_price")?,
            keystore: required_url(&self.urls.keystore, "urls.keystore")?,
            configuration_detail: required_url(
                &self.urls.configuration_detail,
                "urls.configuration_detail",
            )?,
            swap: optional_url(&self.urls.swap, "urls.swap")?,
            faucet: optional_url(&self.urls.faucet, "urls.faucet")?,
        };

        if faucet_available && urls.faucet.is_none() {
            return Err(ConfigError::Missing("urls.faucet".to_string()));
        }
        if !network.is_mainnet() && urls.swap.is_some() {
            tracing::warn!(%network, "Ignoring swap URL outside mainnet");
        }

        Ok(OnboardingSession {
            address,
            configuration_file,
            chain_id,
            network,
            faucet_available,
            required_amount,
            urls: EndpointUrls {
                swap: urls.swap.filter(|_| network.is_mainnet()),
                ..urls
            },
            acknowledgements: self.acknowledgements,
        })
    }
}

impl OnboardingSession {
    /// Whether the optional token swap can be offered for this session.
    pub fn swap_available(&self) -> bool {
        self.network.is_mainnet() && self.urls.swap.is_some()
    }

    /// Checksummed address, as shown next to the clipboard button.
    pub fn checksum_address(&self) -> String {
        self.address.to_checksum(None)
    }
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn required_url(value: &str, key: &str) -> Result<Url, ConfigError> {
    optional_url(value, key)?.ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn optional_url(value: &str, key: &str) -> Result<Option<Url>, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    Url::parse(value)
        .map(Some)
        .map_err(|e| ConfigError::invalid(key, e.to_string()))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}
