//! One full run: resolve the window, rebuild balances, rank and export.

use std::fmt::Write as _;

use tracing::info;

use crate::{
    config::Config,
    export::{export_csv, rank_holders, ExportedFiles, Holder},
    reconstruct::{BalanceReconstructor, Reconstruction},
    rpc::TokenMetadata,
    sources::{BlockIndex, ChainClock, TransferSource},
    window::{Window, WindowResolver},
};

#[derive(Debug)]
pub struct ScanReport {
    pub window: Window,
    pub token: TokenMetadata,
    pub reconstruction: Reconstruction,
    pub holders: Vec<Holder>,
    pub files: ExportedFiles,
    pub top_n: usize,
}

impl ScanReport {
    pub fn top(&self) -> &[Holder] {
        &self.holders[..self.holders.len().min(self.top_n)]
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Window: blocks {} to {} ({} blocks, resolved via {})",
            self.window.start_block,
            self.window.end_block,
            self.window.block_count(),
            self.window.resolved_via
        );
        let _ = writeln!(
            out,
            "Transfers: {} over {} pages",
            self.reconstruction.events.len(),
            self.reconstruction.pages
        );
        let _ = writeln!(
            out,
            "Wrote {} with {} holders (within scanned window).",
            self.files.all.display(),
            self.holders.len()
        );
        let _ = writeln!(out, "Wrote {}", self.files.top.display());
        out
    }
}

/// Runs the pipeline against the given sources. Nothing is written unless the
/// whole window was reconstructed and holds at least one transfer.
pub async fn scan<C, E>(
    config: &Config,
    chain: &C,
    explorer: &E,
    token: TokenMetadata,
) -> crate::Result<ScanReport>
where
    C: ChainClock,
    E: BlockIndex + TransferSource,
{
    let window = WindowResolver::new(chain, explorer, config.retry_policy())
        .resolve(&config.window_request())
        .await?;

    let reconstructor = BalanceReconstructor::new(
        explorer,
        config.rate_gate(),
        config.retry_policy(),
        config.page_size,
        config.max_result_window,
    );
    let reconstruction = reconstructor
        .reconstruct(
            config.contract_address,
            window.start_block,
            window.end_block,
        )
        .await?;

    if reconstruction.events.is_empty() {
        return Err(crate::Error::NoTransfers {
            start_block: window.start_block,
            end_block: window.end_block,
        });
    }

    let holders = rank_holders(&reconstruction.balances);
    info!(holders = holders.len(), symbol = %token.symbol, "ranked holders");

    let files = export_csv(
        &holders,
        &token.symbol,
        token.decimals,
        config.top_n,
        &config.output_dir,
    )?;

    Ok(ScanReport {
        window,
        token,
        reconstruction,
        holders,
        files,
        top_n: config.top_n,
    })
}
