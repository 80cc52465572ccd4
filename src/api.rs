use std::future::Future;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Method name of the transaction that settles a sale.
pub const ACCEPT_BID_METHOD: &str = "acceptBid";

/// Method name of the bid transaction that carries the sale value.
pub const PLACE_BID_METHOD: &str = "placeBid";

/// One page of an address's transactions, newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionPage {
    pub items: Vec<ExplorerTransaction>,
}

/// A transaction as reported by the explorer's v2 API.
///
/// Pending transactions carry no timestamp or block.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerTransaction {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    block: Option<u64>,
    #[serde(default)]
    block_number: Option<u64>,
    /// Native value in wei, as a decimal string.
    #[serde(default)]
    pub value: Option<String>,
    pub from: AddressRef,
    #[serde(default)]
    pub decoded_input: Option<DecodedInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressRef {
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecodedInput {
    #[serde(default)]
    pub method_call: Option<String>,
    #[serde(default)]
    pub parameters: Vec<DecodedParameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecodedParameter {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl ExplorerTransaction {
    /// Block height; older explorer versions call the field `block`.
    pub fn block(&self) -> Option<u64> {
        self.block_number.or(self.block)
    }

    pub fn is_method(&self, name: &str) -> bool {
        self.method.as_deref() == Some(name)
    }

    /// A decoded call parameter rendered as a string (numbers included).
    pub fn parameter(&self, name: &str) -> Option<String> {
        let param = self
            .decoded_input
            .as_ref()?
            .parameters
            .iter()
            .find(|p| p.name == name)?;
        match &param.value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Where the polling pipeline gets its transaction lists from.
pub trait TransactionSource: Send + Sync {
    fn transactions(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Vec<ExplorerTransaction>>> + Send;
}

/// HTTP client for a Blockscout-style explorer API.
#[derive(Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    base: String,
}

impl ExplorerClient {
    pub fn new(http: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn transactions_url(&self, address: &str) -> String {
        format!("{}/addresses/{address}/transactions", self.base)
    }
}

impl TransactionSource for ExplorerClient {
    /// Fetch the latest page of transactions for a contract address.
    async fn transactions(&self, address: &str) -> Result<Vec<ExplorerTransaction>> {
        let url = self.transactions_url(address);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;
        let page: TransactionPage = resp
            .json()
            .await
            .with_context(|| format!("unexpected response shape from {url}"))?;
        debug!("Fetched {} transactions for {address}", page.items.len());
        Ok(page.items)
    }
}
