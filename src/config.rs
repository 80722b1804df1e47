//! Run configuration, assembled once at startup from flags, environment,
//! an optional config file and built-in defaults, in that order of precedence.

use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy::primitives::Address;
use clap::Args;
use directories::ProjectDirs;
use serde::Deserialize;
use url::Url;

use crate::{
    alloy::StringExt,
    rate_limit::RateGate,
    retry::RetryPolicy,
    window::WindowRequest,
};

pub const DEFAULT_RPC_URL: &str = "https://cloudflare-eth.com";
pub const DEFAULT_CHAIN_ID: u64 = 1;
pub const DEFAULT_DAYS_BACK: u64 = 14;
pub const DEFAULT_PAGE_SIZE: u64 = 10_000;
pub const DEFAULT_MAX_RESULT_WINDOW: u64 = 10_000;
pub const DEFAULT_RATE_LIMIT_INTERVAL: &str = "210ms";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: &str = "500ms";
pub const DEFAULT_RETRY_BACKOFF_MAX: &str = "30s";
pub const DEFAULT_REQUEST_TIMEOUT: &str = "20s";
pub const DEFAULT_SEARCH_TOLERANCE: u64 = 1;
pub const DEFAULT_TOP_N: usize = 20;

/// One source of settings. Every field is optional so layers can be stacked
/// with [`ConfigLayer::or`]; the same struct backs the CLI flags and the
/// config file.
#[derive(Args, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    /// ERC-20 contract to scan
    #[arg(long, env = "CONTRACT_ADDRESS")]
    pub contract_address: Option<String>,

    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    pub etherscan_api_key: Option<String>,

    #[arg(long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    /// Etherscan v2 compatible API endpoint
    #[arg(long, env = "EXPLORER_URL")]
    pub explorer_url: Option<String>,

    #[arg(long, env = "CHAIN_ID")]
    pub chain_id: Option<u64>,

    /// Length of the trailing window, in days
    #[arg(long, env = "DAYS_BACK")]
    pub days_back: Option<u64>,

    /// Pin the first block instead of searching for it
    #[arg(long, env = "START_BLOCK")]
    pub start_block: Option<u64>,

    /// Pin the last block instead of using the chain head
    #[arg(long, env = "END_BLOCK")]
    pub end_block: Option<u64>,

    #[arg(long, env = "PAGE_SIZE")]
    pub page_size: Option<u64>,

    /// Cap on page * page_size for a single explorer query
    #[arg(long, env = "MAX_RESULT_WINDOW")]
    pub max_result_window: Option<u64>,

    /// Minimum delay between explorer requests, e.g. "210ms"
    #[arg(long, env = "RATE_LIMIT_INTERVAL")]
    pub rate_limit_interval: Option<String>,

    #[arg(long, env = "MAX_RETRIES")]
    pub max_retries: Option<u32>,

    #[arg(long, env = "RETRY_BACKOFF")]
    pub retry_backoff: Option<String>,

    #[arg(long, env = "RETRY_BACKOFF_MAX")]
    pub retry_backoff_max: Option<String>,

    #[arg(long, env = "REQUEST_TIMEOUT")]
    pub request_timeout: Option<String>,

    /// Width in blocks at which the start block search stops
    #[arg(long, env = "SEARCH_TOLERANCE")]
    pub search_tolerance: Option<u64>,

    #[arg(long, env = "TOP_N")]
    pub top_n: Option<usize>,

    #[arg(long, env = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Skip the symbol() lookup
    #[arg(long, env = "TOKEN_SYMBOL")]
    pub symbol: Option<String>,

    /// Skip the decimals() lookup
    #[arg(long, env = "TOKEN_DECIMALS")]
    pub decimals: Option<u8>,
}

impl ConfigLayer {
    /// Fills every unset field from `lower`.
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            contract_address: self.contract_address.or(lower.contract_address),
            etherscan_api_key: self.etherscan_api_key.or(lower.etherscan_api_key),
            rpc_url: self.rpc_url.or(lower.rpc_url),
            explorer_url: self.explorer_url.or(lower.explorer_url),
            chain_id: self.chain_id.or(lower.chain_id),
            days_back: self.days_back.or(lower.days_back),
            start_block: self.start_block.or(lower.start_block),
            end_block: self.end_block.or(lower.end_block),
            page_size: self.page_size.or(lower.page_size),
            max_result_window: self.max_result_window.or(lower.max_result_window),
            rate_limit_interval: self.rate_limit_interval.or(lower.rate_limit_interval),
            max_retries: self.max_retries.or(lower.max_retries),
            retry_backoff: self.retry_backoff.or(lower.retry_backoff),
            retry_backoff_max: self.retry_backoff_max.or(lower.retry_backoff_max),
            request_timeout: self.request_timeout.or(lower.request_timeout),
            search_tolerance: self.search_tolerance.or(lower.search_tolerance),
            top_n: self.top_n.or(lower.top_n),
            output_dir: self.output_dir.or(lower.output_dir),
            symbol: self.symbol.or(lower.symbol),
            decimals: self.decimals.or(lower.decimals),
        }
    }

    /// Reads a TOML or YAML layer, picked by the file extension.
    pub fn load(path: &Path) -> crate::Result<ConfigLayer> {
        let content =
            fs::read_to_string(path).map_err(|e| crate::Error::FileReadFailed(path.into(), e))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| crate::Error::TomlParsingFailed(path.into(), e))
            }
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| crate::Error::YamlParsingFailed(path.into(), e)),
            _ => Err(crate::Error::UnsupportedConfigFormat(path.into())),
        }
    }

    /// `config.toml` in the platform config directory, when it exists.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("xyz", "erc20-holders", "holders")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|path| path.exists())
    }
}

/// Explorer API key. Kept out of `Debug` output and logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub contract_address: Address,
    pub etherscan_api_key: ApiKey,
    pub rpc_url: Url,
    pub explorer_url: Url,
    pub chain_id: u64,
    pub days_back: u64,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    pub page_size: u64,
    pub max_result_window: u64,
    pub rate_limit_interval: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub retry_backoff_max: Duration,
    pub request_timeout: Duration,
    pub search_tolerance: u64,
    pub top_n: usize,
    pub output_dir: PathBuf,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

impl TryFrom<ConfigLayer> for Config {
    type Error = crate::Error;

    /// Applies defaults to whatever the layers left unset, then validates.
    fn try_from(layer: ConfigLayer) -> crate::Result<Config> {
        let contract_address = layer
            .contract_address
            .ok_or(crate::Error::ConfigMissing("CONTRACT_ADDRESS"))?
            .parse_as_address()?;

        let etherscan_api_key = layer
            .etherscan_api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(crate::Error::ConfigMissing("ETHERSCAN_API_KEY"))?;

        let config = Config {
            contract_address,
            etherscan_api_key: ApiKey(etherscan_api_key),
            rpc_url: parse_url(layer.rpc_url.as_deref().unwrap_or(DEFAULT_RPC_URL))?,
            explorer_url: parse_url(
                layer
                    .explorer_url
                    .as_deref()
                    .unwrap_or(crate::etherscan::DEFAULT_API_URL),
            )?,
            chain_id: layer.chain_id.unwrap_or(DEFAULT_CHAIN_ID),
            days_back: layer.days_back.unwrap_or(DEFAULT_DAYS_BACK),
            start_block: layer.start_block,
            end_block: layer.end_block,
            page_size: layer.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            max_result_window: layer
                .max_result_window
                .unwrap_or(DEFAULT_MAX_RESULT_WINDOW),
            rate_limit_interval: parse_duration(
                "rate_limit_interval",
                layer.rate_limit_interval.as_deref(),
                DEFAULT_RATE_LIMIT_INTERVAL,
            )?,
            max_retries: layer.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_backoff: parse_duration(
                "retry_backoff",
                layer.retry_backoff.as_deref(),
                DEFAULT_RETRY_BACKOFF,
            )?,
            retry_backoff_max: parse_duration(
                "retry_backoff_max",
                layer.retry_backoff_max.as_deref(),
                DEFAULT_RETRY_BACKOFF_MAX,
            )?,
            request_timeout: parse_duration(
                "request_timeout",
                layer.request_timeout.as_deref(),
                DEFAULT_REQUEST_TIMEOUT,
            )?,
            search_tolerance: layer.search_tolerance.unwrap_or(DEFAULT_SEARCH_TOLERANCE),
            top_n: layer.top_n.unwrap_or(DEFAULT_TOP_N),
            output_dir: layer.output_dir.unwrap_or_else(|| PathBuf::from(".")),
            symbol: layer
                .symbol
                .map(|symbol| symbol.trim().to_string())
                .filter(|symbol| !symbol.is_empty()),
            decimals: layer.decimals,
        };

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    fn validate(&self) -> crate::Result<()> {
        let at_least_one = |name, value: u64| {
            if value == 0 {
                Err(invalid(name, "must be at least 1"))
            } else {
                Ok(())
            }
        };
        at_least_one("page_size", self.page_size)?;
        at_least_one("search_tolerance", self.search_tolerance)?;
        at_least_one("top_n", self.top_n as u64)?;

        if self.max_result_window < self.page_size {
            return Err(invalid(
                "max_result_window",
                format!("must not be below page_size ({})", self.page_size),
            ));
        }
        if self.retry_backoff_max < self.retry_backoff {
            return Err(invalid(
                "retry_backoff_max",
                "must not be below retry_backoff",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn window_request(&self) -> WindowRequest {
        WindowRequest {
            days_back: self.days_back,
            start_block: self.start_block,
            end_block: self.end_block,
            tolerance: self.search_tolerance,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: self.retry_backoff,
            max_backoff: self.retry_backoff_max,
        }
    }

    pub fn rate_gate(&self) -> RateGate {
        RateGate::new(self.rate_limit_interval)
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> crate::Error {
    crate::Error::ConfigInvalid {
        name,
        reason: reason.into(),
    }
}

fn parse_url(value: &str) -> crate::Result<Url> {
    let url = Url::parse(value.trim())
        .map_err(|e| crate::Error::UrlParsingFailed(value.to_string(), e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(crate::Error::InvalidUrl(value.to_string())),
    }
}

fn parse_duration(name: &'static str, value: Option<&str>, default: &str) -> crate::Result<Duration> {
    humantime::parse_duration(value.unwrap_or(default).trim())
        .map_err(|e| invalid(name, e.to_string()))
}
