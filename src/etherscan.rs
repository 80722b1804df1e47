//! Client for Etherscan-compatible explorer APIs (Etherscan v2, Blockscout's
//! `/api` endpoint and the like).

use std::{fmt::Debug, time::Duration};

use alloy::primitives::{Address, TxHash, U256, U64};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr};
use tracing::debug;

use crate::{
    serde::SerdeResponseParse,
    sources::{BlockIndex, TransferSource},
    transfer::TransferEvent,
    Reqwest,
};

pub const DEFAULT_API_URL: &str = "https://api.etherscan.io/v2/api";

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<Value>,
}

impl EtherscanResponse {
    fn into_result(self) -> crate::Result<Value> {
        // proxy module answers in JSON-RPC shape
        if let Some(error) = self.error {
            return Err(crate::Error::ExplorerApi {
                message: "JSON-RPC error".to_string(),
                result: error.to_string(),
            });
        }

        let result_text = match &self.result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        if self.status.as_deref() == Some("0") {
            let message = self.message.unwrap_or_default();
            if mentions_rate_limit(&message) || mentions_rate_limit(&result_text) {
                return Err(crate::Error::RateLimitExceeded(result_text));
            }
            if is_empty_listing(&message) {
                return Ok(Value::Array(Vec::new()));
            }
            return Err(crate::Error::ExplorerApi {
                message,
                result: result_text,
            });
        }

        if self.result.is_string() && mentions_rate_limit(&result_text) {
            return Err(crate::Error::RateLimitExceeded(result_text));
        }

        Ok(self.result)
    }
}

fn mentions_rate_limit(text: &str) -> bool {
    text.to_ascii_lowercase().contains("rate limit")
}

fn is_empty_listing(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.starts_with("no transactions found") || message.starts_with("no records found")
}

fn parse_number(s: &str) -> crate::Result<u64> {
    s.trim()
        .parse::<u64>()
        .map_err(|_| crate::Error::InvalidNumber(s.to_string()))
}

/// One row of `module=account&action=tokentx`.
#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransfer {
    #[serde_as(as = "DisplayFromStr")]
    block_number: u64,
    hash: TxHash,
    from: Address,
    to: Address,
    #[serde_as(as = "DisplayFromStr")]
    value: U256,
    #[serde_as(as = "Option<DisplayFromStr>")]
    log_index: Option<u64>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    transaction_index: Option<u64>,
}

impl From<TokenTransfer> for TransferEvent {
    fn from(row: TokenTransfer) -> Self {
        // Etherscan's tokentx omits logIndex; the transaction index is the
        // closest intra-block position it reports.
        let log_index = row.log_index.or(row.transaction_index).unwrap_or_default();
        TransferEvent {
            from: row.from,
            to: row.to,
            value: row.value,
            block_number: row.block_number,
            log_index,
            transaction_hash: row.hash,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyBlock {
    timestamp: U64,
}

pub struct Etherscan {
    client: Client,
    api_url: String,
    api_key: String,
    chain_id: u64,
    timeout: Duration,
}

impl Etherscan {
    pub fn new(api_url: &str, api_key: &str, chain_id: u64, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            chain_id,
            timeout,
        }
    }

    async fn call<T: DeserializeOwned>(&self, params: &[(&str, String)]) -> crate::Result<T> {
        debug!(?params, "explorer request");

        let response = Reqwest::get(&self.client, &self.api_url)?
            .query(&[("chainid", self.chain_id.to_string())])
            .query(&params)
            .secret_query("apikey", &self.api_key)
            .timeout(self.timeout)
            .receive_json::<EtherscanResponse>()
            .await?;

        response.into_result()?.serde_parse_custom()
    }
}

impl BlockIndex for Etherscan {
    async fn latest_block(&self) -> crate::Result<u64> {
        let block: U64 = self
            .call(&[
                ("module", "proxy".to_string()),
                ("action", "eth_blockNumber".to_string()),
            ])
            .await?;
        Ok(block.to())
    }

    async fn block_timestamp(&self, block: u64) -> crate::Result<u64> {
        let found: Option<ProxyBlock> = self
            .call(&[
                ("module", "proxy".to_string()),
                ("action", "eth_getBlockByNumber".to_string()),
                ("tag", format!("{block:#x}")),
                ("boolean", "false".to_string()),
            ])
            .await?;
        found
            .map(|b| b.timestamp.to())
            .ok_or(crate::Error::BlockNotFound(block))
    }

    async fn block_at_or_after(&self, timestamp: u64) -> crate::Result<u64> {
        let block: String = self
            .call(&[
                ("module", "block".to_string()),
                ("action", "getblocknobytime".to_string()),
                ("timestamp", timestamp.to_string()),
                ("closest", "after".to_string()),
            ])
            .await?;
        parse_number(&block)
    }
}

impl TransferSource for Etherscan {
    async fn transfers(
        &self,
        contract: Address,
        start_block: u64,
        end_block: u64,
        page: u64,
        page_size: u64,
    ) -> crate::Result<Vec<TransferEvent>> {
        let rows: Vec<TokenTransfer> = self
            .call(&[
                ("module", "account".to_string()),
                ("action", "tokentx".to_string()),
                ("contractaddress", contract.to_string()),
                ("startblock", start_block.to_string()),
                ("endblock", end_block.to_string()),
                ("page", page.to_string()),
                ("offset", page_size.to_string()),
                ("sort", "asc".to_string()),
            ])
            .await?;
        Ok(rows.into_iter().map(TransferEvent::from).collect())
    }
}
