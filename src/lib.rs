pub mod alloy;
pub mod balances;
pub mod cli;
pub mod config;
pub mod error;
pub mod etherscan;
pub mod export;
pub mod log;
pub mod rate_limit;
pub mod reconstruct;
pub mod reqwest;
pub mod retry;
pub mod rpc;
pub mod scan;
pub mod serde;
pub mod sources;
pub mod transfer;
pub mod window;

#[cfg(test)]
pub mod testutils;

pub use error::{Error, Result};
pub use reqwest::Reqwest;
