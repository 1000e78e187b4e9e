//! HTTP backend: talks to the installer's web endpoints with reqwest.

use std::time::Duration;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::BackendError;
use crate::onboarding::model::{EndpointUrls, Network};

use super::{
    ConfigurationDetail, FaucetService, OnboardingBackend, SwapQuote, SwapRequest,
    TaskStatusReport,
};

/// Gas price response. The backend sends either a JSON number or a decimal string.
#[derive(Debug, Deserialize)]
struct GasPriceResponse {
    gas_price: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ReferenceResponse {
    #[serde(alias = "tx_hash", alias = "id")]
    reference: String,
}

/// reqwest-backed implementation of [`OnboardingBackend`] and [`FaucetService`].
pub struct HttpBackend {
    urls: EndpointUrls,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(urls: EndpointUrls, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::RequestFailed {
                endpoint: "client".into(),
                reason: e.to_string(),
            })?;
        Ok(Self { urls, client })
    }

    fn swap_url(&self) -> Result<&Url, BackendError> {
        self.urls
            .swap
            .as_ref()
            .ok_or_else(|| BackendError::NotConfigured("swap".into()))
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let resp = request.send().await.map_err(|e| BackendError::RequestFailed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(endpoint, status = status.as_u16(), "Backend returned error status");
            return Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }

    async fn json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        self.send(endpoint, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl OnboardingBackend for HttpBackend {
    async fn gas_price(&self) -> Result<U256, BackendError> {
        let resp: GasPriceResponse = self
            .json("gas_price", self.client.get(self.urls.gas_price.clone()))
            .await?;
        parse_wei(&resp.gas_price).ok_or_else(|| BackendError::InvalidResponse {
            endpoint: "gas_price".into(),
            reason: format!("not a wei amount: {}", resp.gas_price),
        })
    }

    async fn keystore(&self) -> Result<Vec<u8>, BackendError> {
        let resp = self
            .send("keystore", self.client.get(self.urls.keystore.clone()))
            .await?;
        let bytes = resp.bytes().await.map_err(|e| BackendError::RequestFailed {
            endpoint: "keystore".into(),
            reason: e.to_string(),
        })?;
        if bytes.is_empty() {
            return Err(BackendError::InvalidResponse {
                endpoint: "keystore".into(),
                reason: "empty keystore file".into(),
            });
        }
        Ok(bytes.to_vec())
    }

    async fn configuration_detail(&self) -> Result<ConfigurationDetail, BackendError> {
        self.json(
            "configuration_detail",
            self.client.get(self.urls.configuration_detail.clone()),
        )
        .await
    }

    async fn swap_quote(&self, token: &str, amount: Decimal) -> Result<SwapQuote, BackendError> {
        let url = self.swap_url()?.clone();
        let request = self
            .client
            .get(url)
            .query(&[("token", token.to_string()), ("amount", amount.to_string())]);
        self.json("swap_quote", request).await
    }

    async fn submit_swap(&self, request: &SwapRequest) -> Result<String, BackendError> {
        let url = self.swap_url()?.clone();
        let resp: ReferenceResponse = self
            .json("swap", self.client.post(url).json(request))
            .await?;
        Ok(resp.reference)
    }

    async fn swap_status(&self, reference: &str) -> Result<TaskStatusReport, BackendError> {
        let url = swap_status_url(self.swap_url()?, reference)?;
        self.json("swap_status", self.client.get(url)).await
    }
}

#[async_trait]
impl FaucetService for HttpBackend {
    async fn request_funds(
        &self,
        address: Address,
        network: Network,
    ) -> Result<String, BackendError> {
        let url = self
            .urls
            .faucet
            .clone()
            .ok_or_else(|| BackendError::NotConfigured("faucet".into()))?;
        let body = serde_json::json!({
            "address": address.to_checksum(None),
            "network": network.name(),
        });
        let resp: ReferenceResponse = self.json("faucet", self.client.post(url).json(&body)).await?;
        tracing::info!(%address, %network, reference = %resp.reference, "Faucet request accepted");
        Ok(resp.reference)
    }
}

/// `<swap url>/<reference>`, tolerating a trailing slash on the swap URL.
fn swap_status_url(swap_url: &Url, reference: &str) -> Result<Url, BackendError> {
    let mut url = swap_url.clone();
    url.path_segments_mut()
        .map_err(|_| BackendError::NotConfigured("swap status".into()))?
        .pop_if_empty()
        .push(reference);
    Ok(url)
}

fn parse_wei(value: &serde_json::Value) -> Option<U256> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(U256::from),
        serde_json::Value::String(s) => s.trim().parse::<U256>().ok(),
        _ => None,
    }
}
