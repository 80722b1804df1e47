use std::{ffi::OsString, path::PathBuf};

use clap::{CommandFactory, FromArgMatches, Parser};
use tracing::info;

use crate::{
    alloy::StringExt,
    config::{Config, ConfigLayer},
    etherscan::Etherscan,
    export::render_chart,
    rpc::{RpcChain, TokenMetadata},
    scan::{scan, ScanReport},
};

pub const CHART_WIDTH: u16 = 40;

/// Top level CLI struct
#[derive(Parser, Debug)]
#[command(name = "holders", bin_name = "holders", version)]
#[command(about = "Reconstruct ERC-20 holder balances over a trailing block window")]
pub struct Cli {
    #[command(flatten)]
    pub settings: ConfigLayer,

    /// TOML or YAML file with settings, below flags and environment
    #[arg(long = "config", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Log filter such as "debug" or "holders_lib=trace", overrides RUST_LOG
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Parses `args` like [`Parser::try_parse_from`], except that a variable
    /// that is set but blank (`START_BLOCK=`) counts as unset.
    pub fn parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Cli::command()
            .mut_args(|arg| {
                let blank = arg
                    .get_env()
                    .and_then(std::env::var_os)
                    .is_some_and(|value| value.to_string_lossy().trim().is_empty());
                if blank {
                    arg.env(None::<&'static str>)
                } else {
                    arg
                }
            })
            .try_get_matches_from(args)?;
        Cli::from_arg_matches(&matches)
    }

    /// Flags and environment, then the config file, then defaults.
    pub fn config(&self) -> crate::Result<Config> {
        let file = match self.config_file.clone().or_else(ConfigLayer::default_path) {
            Some(path) => ConfigLayer::load(&path)?,
            None => ConfigLayer::default(),
        };
        Config::try_from(self.settings.clone().or(file))
    }

    pub async fn run(&self) -> crate::Result<()> {
        let config = self.config()?;
        let report = run(&config).await?;

        print!("{}", report.summary());
        println!();
        print!(
            "{}",
            render_chart(
                report.top(),
                &report.token.symbol,
                report.token.decimals,
                CHART_WIDTH
            )?
        );
        Ok(())
    }
}

/// Connects to the configured RPC node and explorer and scans.
pub async fn run(config: &Config) -> crate::Result<ScanReport> {
    info!(
        contract = %config.contract_address,
        chain_id = config.chain_id,
        days_back = config.days_back,
        "scanning token holders"
    );

    let chain = RpcChain::new(
        config.rpc_url.as_str().to_alloy_provider()?,
        config.request_timeout,
    );
    let explorer = Etherscan::new(
        config.explorer_url.as_str(),
        config.etherscan_api_key.expose(),
        config.chain_id,
        config.request_timeout,
    );

    let token = match (&config.symbol, config.decimals) {
        (Some(symbol), Some(decimals)) => TokenMetadata {
            symbol: symbol.clone(),
            decimals,
        },
        (symbol, decimals) => chain
            .token_metadata(config.contract_address)
            .await
            .with_overrides(symbol.as_deref(), decimals),
    };
    info!(symbol = %token.symbol, decimals = token.decimals, "token metadata");

    scan(config, &chain, &explorer, token).await
}
