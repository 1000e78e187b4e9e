//! Token swap cost estimation.
//!
//! The ETH to sell is padded by [`EXCHANGE_PRICE_MARGIN`] so the trade still
//! clears if the rate moves, and the gas estimate by [`GAS_LIMIT_MARGIN`],
//! capped at 90% of the block gas limit. The gas price never exceeds the
//! exchange's own ceiling when it reports one.

use alloy_primitives::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::backend::SwapQuote;
use crate::error::ExchangeError;
use crate::onboarding::model::{ETH_DECIMALS, EthAmount, Network, decimal_to_wei};

pub const EXCHANGE_PRICE_MARGIN: Decimal = dec!(1.2);
pub const GAS_LIMIT_MARGIN: Decimal = dec!(1.5);
const MAX_BLOCK_GAS_SHARE: Decimal = dec!(0.9);

/// Decentralized exchanges the installer can buy tokens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    Kyber,
    Uniswap,
}

impl Exchange {
    pub fn from_name(name: &str) -> Result<Self, ExchangeError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "kyber" => Ok(Self::Kyber),
            "uniswap" => Ok(Self::Uniswap),
            _ => Err(ExchangeError::UnknownExchange(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Kyber => "Kyber",
            Self::Uniswap => "Uniswap",
        }
    }

    pub fn supports(&self, network: Network) -> bool {
        match self {
            Self::Kyber => matches!(network, Network::Mainnet | Network::Ropsten),
            // Uniswap's router lives at the same address on every network it supports.
            Self::Uniswap => true,
        }
    }
}

/// Estimated costs of a swap, all in ETH/wei.
#[derive(Debug, Clone, Serialize)]
pub struct SwapCosts {
    pub exchange: Exchange,
    pub token: String,
    pub exchange_rate: Decimal,
    pub gas_price_wei: U256,
    pub gas: u64,
    pub eth_sold: EthAmount,
    pub gas_cost: EthAmount,
    pub total: EthAmount,
}

/// Compute the full cost of executing `quote` on `network`.
pub fn calculate_costs(quote: &SwapQuote, network: Network) -> Result<SwapCosts, ExchangeError> {
    let exchange = Exchange::from_name(&quote.exchange)?;
    if !exchange.supports(network) {
        return Err(ExchangeError::UnsupportedNetwork {
            exchange: exchange.name().to_string(),
            network: network.to_string(),
        });
    }
    if !quote.listed {
        return Err(ExchangeError::NotListed {
            exchange: exchange.name().to_string(),
            token: quote.token.clone(),
        });
    }
    if quote.token_amount <= Decimal::ZERO {
        return Err(ExchangeError::InvalidAmount(format!(
            "{} {}",
            quote.token_amount, quote.token
        )));
    }
    if quote.exchange_rate <= Decimal::ZERO {
        return Err(ExchangeError::NoLiquidity);
    }

    let eth_sold_value = (quote.token_amount * quote.exchange_rate * EXCHANGE_PRICE_MARGIN)
        .round_dp(ETH_DECIMALS);
    let eth_sold_wei = decimal_to_wei(eth_sold_value)
        .ok_or_else(|| ExchangeError::InvalidAmount(eth_sold_value.to_string()))?;

    let gas_with_margin = (Decimal::from(quote.gas_estimate) * GAS_LIMIT_MARGIN).floor();
    let max_gas_limit = (Decimal::from(quote.block_gas_limit) * MAX_BLOCK_GAS_SHARE).floor();
    let gas = gas_with_margin
        .min(max_gas_limit)
        .to_u64()
        .ok_or_else(|| ExchangeError::InvalidAmount(format!("gas {gas_with_margin}")))?;

    let gas_price_wei = match quote.max_gas_price_wei {
        Some(ceiling) => quote.gas_price_wei.min(ceiling),
        None => quote.gas_price_wei,
    };
    let gas_cost_wei = U256::from(gas) * gas_price_wei;
    let total_wei = gas_cost_wei + eth_sold_wei;

    let to_amount = |wei: U256| {
        EthAmount::from_wei(wei).ok_or_else(|| ExchangeError::InvalidAmount(wei.to_string()))
    };

    tracing::debug!(
        exchange = exchange.name(),
        token = %quote.token,
        gas,
        eth_sold = %eth_sold_value,
        "Calculated swap costs"
    );

    Ok(SwapCosts {
        exchange,
        token: quote.token.clone(),
        exchange_rate: quote.exchange_rate,
        gas_price_wei,
        gas,
        eth_sold: to_amount(eth_sold_wei)?,
        gas_cost: to_amount(gas_cost_wei)?,
        total: to_amount(total_wei)?,
    })
}
