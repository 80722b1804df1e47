use std::path::PathBuf;

use alloy::primitives::Address;
use serde_json::Value;
use url::Url;

use crate::reqwest::{ReqwestErrorContext, ReqwestInnerError, ReqwestStage};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Could not resolve the block window. RPC failed with: {rpc}. Explorer failed with: {explorer}.")]
    WindowResolution {
        rpc: Box<Error>,
        explorer: Box<Error>,
    },

    #[error("Fetching transfers failed on page {page} after {attempts} attempt(s). (Error: {source})")]
    DataSource {
        page: u64,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Explorer rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Explorer rejected the request: {message} ({result})")]
    ExplorerApi { message: String, result: String },

    #[error("Block {0} was not found.")]
    BlockNotFound(u64),

    #[error("Block {block} alone holds more transfers than the explorer result window of {window}.")]
    ResultWindowExhausted { block: u64, window: u64 },

    #[error("RPC call {method} failed. (Error: {error})")]
    Rpc {
        method: &'static str,
        error: Box<alloy::transports::TransportError>,
    },

    #[error("Start block {start_block} is after end block {end_block}.")]
    InvalidWindow { start_block: u64, end_block: u64 },

    #[error("Balance overflow while applying a transfer of {value} to {address}.")]
    BalanceOverflow {
        address: Address,
        value: alloy::primitives::U256,
    },

    #[error("No transfers found in blocks {start_block}..={end_block}. Try a different window or token.")]
    NoTransfers { start_block: u64, end_block: u64 },

    #[error("{0} is not set, please set it via flag, environment or config file.")]
    ConfigMissing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    ConfigInvalid { name: &'static str, reason: String },

    #[error("Address '{0}' is not a valid Ethereum address.")]
    InvalidAddress(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to parse URL: {0}. (Error: {1:?})")]
    UrlParsingFailed(String, url::ParseError),

    #[error("Failed to parse number '{0}' returned by the explorer.")]
    InvalidNumber(String),

    #[error("Failed to read the file: {0}. (Error: {1:?})")]
    FileReadFailed(PathBuf, std::io::Error),

    #[error("Failed to write to the file: {0}. (Error: {1:?})")]
    FileWriteFailed(PathBuf, std::io::Error),

    #[error("Failed to create directory: {0:?}. (Error: {1:?})")]
    CreateDirAllFailed(PathBuf, std::io::Error),

    #[error("Parsing the toml file failed: {0}. (Error: {1:?})")]
    TomlParsingFailed(PathBuf, toml::de::Error),

    #[error("Parsing the yaml file failed: {0}. (Error: {1:?})")]
    YamlParsingFailed(PathBuf, serde_yaml::Error),

    #[error("Unsupported config file extension: {0}. Use .toml, .yaml or .yml.")]
    UnsupportedConfigFormat(PathBuf),

    #[error("Failed to format balance. (Error: {0})")]
    FormatUnits(#[from] alloy::primitives::utils::UnitsError),

    #[error("Failed to install the log subscriber. (Error: {0})")]
    LogInit(String),

    #[error("Failed to parse JSON value: {0:?}. (Error: {1:?})")]
    SerdeJsonValueParseFailed(Value, serde_json::Error),

    #[error(transparent)]
    SerdePathToError(#[from] serde_path_to_error::Error<serde_json::Error>),

    #[error("Please check your internet connection, the URL seems to be unreachable: {0}")]
    Internet(Url),

    #[error("Request timed out after {0:?}.")]
    Timeout(std::time::Duration),

    #[error("Request '{url}' failed at stage '{stage:?}' (Error='{inner:?}', Context='{context:?}')", url = context.url)]
    ReqwestFailed {
        stage: ReqwestStage,
        context: Box<ReqwestErrorContext>,
        inner: ReqwestInnerError,
    },

    #[error("Reqwest builder missing error context, this is a bug please report it.")]
    ReqwestErrorContextMissing,
}

impl Error {
    /// Transient failures worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitExceeded(_) | Self::Internet(_) | Self::Timeout(_) => true,
            Self::ReqwestFailed { stage, inner, .. } => match stage {
                ReqwestStage::Send | ReqwestStage::DecodeText => true,
                ReqwestStage::Status => inner.is_transient_status(),
                ReqwestStage::Deserialise => false,
            },
            Self::Rpc { .. } => true,
            _ => false,
        }
    }
}
