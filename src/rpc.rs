use std::{
    future::IntoFuture,
    time::Duration,
};

use alloy::{
    eips::BlockNumberOrTag, primitives::Address, providers::Provider, sol,
    transports::TransportError,
};
use tracing::warn;

use crate::sources::ChainClock;

sol! {
    #[sol(rpc)]
    interface IERC20Metadata {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

pub const DEFAULT_SYMBOL: &str = "TOKEN";
pub const DEFAULT_DECIMALS: u8 = 18;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMetadata {
    pub fn with_overrides(self, symbol: Option<&str>, decimals: Option<u8>) -> Self {
        Self {
            symbol: symbol.map(str::to_string).unwrap_or(self.symbol),
            decimals: decimals.unwrap_or(self.decimals),
        }
    }
}

/// Chain access over JSON-RPC. Every call is bounded by `timeout`.
pub struct RpcChain<P> {
    provider: P,
    timeout: Duration,
}

impl<P: Provider> RpcChain<P> {
    pub fn new(provider: P, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    async fn bounded<T, F>(&self, method: &'static str, call: F) -> crate::Result<T>
    where
        F: IntoFuture<Output = Result<T, TransportError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| crate::Error::Timeout(self.timeout))?
            .map_err(|error| crate::Error::Rpc {
                method,
                error: Box::new(error),
            })
    }

    /// Reads `symbol()` and `decimals()`. Each one falls back to a default
    /// when the call fails, so non-standard tokens still export.
    pub async fn token_metadata(&self, token: Address) -> TokenMetadata {
        let contract = IERC20Metadata::new(token, &self.provider);

        let symbol = match tokio::time::timeout(self.timeout, contract.symbol().call()).await {
            Ok(Ok(symbol)) => symbol,
            Ok(Err(error)) => {
                warn!(%token, %error, "symbol() failed, using {DEFAULT_SYMBOL}");
                DEFAULT_SYMBOL.to_string()
            }
            Err(_) => {
                warn!(%token, "symbol() timed out, using {DEFAULT_SYMBOL}");
                DEFAULT_SYMBOL.to_string()
            }
        };

        let decimals = match tokio::time::timeout(self.timeout, contract.decimals().call()).await {
            Ok(Ok(decimals)) => decimals,
            Ok(Err(error)) => {
                warn!(%token, %error, "decimals() failed, using {DEFAULT_DECIMALS}");
                DEFAULT_DECIMALS
            }
            Err(_) => {
                warn!(%token, "decimals() timed out, using {DEFAULT_DECIMALS}");
                DEFAULT_DECIMALS
            }
        };

        TokenMetadata { symbol, decimals }
    }
}

impl<P: Provider> ChainClock for RpcChain<P> {
    async fn latest_block(&self) -> crate::Result<u64> {
        self.bounded("eth_blockNumber", self.provider.get_block_number())
            .await
    }

    async fn block_timestamp(&self, block: u64) -> crate::Result<u64> {
        let found = self
            .bounded(
                "eth_getBlockByNumber",
                self.provider.get_block_by_number(BlockNumberOrTag::Number(block)),
            )
            .await?;
        found
            .map(|b| b.header.timestamp)
            .ok_or(crate::Error::BlockNotFound(block))
    }
}
