//! Resolves the inclusive block range covering the trailing `days_back` days.
//!
//! The RPC node is asked first: the start block is found by binary search over
//! block timestamps. When any RPC call fails, the explorer answers instead
//! using its block-by-timestamp index. Both failing is fatal for the run.

use strum_macros::Display;
use tracing::{debug, info, warn};

use crate::{
    retry::RetryPolicy,
    sources::{BlockIndex, ChainClock},
};

pub const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WindowSource {
    Rpc,
    Explorer,
    Configured,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start_block: u64,
    pub end_block: u64,
    pub resolved_via: WindowSource,
}

impl Window {
    /// Saturates for the full `0..=u64::MAX` range.
    pub fn block_count(&self) -> u64 {
        (self.end_block - self.start_block).saturating_add(1)
    }
}

/// What the caller wants; pinned boundaries skip the matching lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowRequest {
    pub days_back: u64,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    /// Width in blocks at which the binary search stops.
    pub tolerance: u64,
}

impl WindowRequest {
    fn lookback_secs(&self) -> u64 {
        self.days_back.saturating_mul(SECONDS_PER_DAY)
    }
}

pub struct WindowResolver<'a, C, E> {
    chain: &'a C,
    explorer: &'a E,
    retry: RetryPolicy,
}

impl<'a, C: ChainClock, E: BlockIndex> WindowResolver<'a, C, E> {
    /// `retry` applies to explorer calls only; an RPC failure switches to the
    /// explorer straight away.
    pub fn new(chain: &'a C, explorer: &'a E, retry: RetryPolicy) -> Self {
        Self {
            chain,
            explorer,
            retry,
        }
    }

    pub async fn resolve(&self, request: &WindowRequest) -> crate::Result<Window> {
        let window = match (request.start_block, request.end_block) {
            (Some(start_block), Some(end_block)) => Window {
                start_block,
                end_block,
                resolved_via: WindowSource::Configured,
            },
            _ => match self.resolve_via_rpc(request).await {
                Ok(window) => window,
                Err(rpc) => {
                    warn!(error = %rpc, "RPC window resolution failed, falling back to the explorer");
                    self.resolve_via_explorer(request)
                        .await
                        .map_err(|explorer| crate::Error::WindowResolution {
                            rpc: Box::new(rpc),
                            explorer: Box::new(explorer),
                        })?
                }
            },
        };

        if window.start_block > window.end_block {
            return Err(crate::Error::InvalidWindow {
                start_block: window.start_block,
                end_block: window.end_block,
            });
        }

        info!(
            start_block = window.start_block,
            end_block = window.end_block,
            blocks = window.block_count(),
            via = %window.resolved_via,
            "resolved block window"
        );
        Ok(window)
    }

    async fn resolve_via_rpc(&self, request: &WindowRequest) -> crate::Result<Window> {
        let end_block = match request.end_block {
            Some(end_block) => end_block,
            None => self.chain.latest_block().await?,
        };

        let start_block = match request.start_block {
            Some(start_block) => start_block,
            None => {
                let end_ts = self.chain.block_timestamp(end_block).await?;
                let cutoff = end_ts.saturating_sub(request.lookback_secs());
                search_block_at(self.chain, cutoff, end_block, end_ts, request.tolerance).await?
            }
        };

        Ok(Window {
            start_block,
            end_block,
            resolved_via: WindowSource::Rpc,
        })
    }

    async fn resolve_via_explorer(&self, request: &WindowRequest) -> crate::Result<Window> {
        let explorer = self.explorer;
        let retried = |error: crate::retry::RetryExhausted| error.error;

        let end_block = match request.end_block {
            Some(end_block) => end_block,
            None => self
                .retry
                .run("latest block", || explorer.latest_block())
                .await
                .map_err(retried)?,
        };

        let start_block = match request.start_block {
            Some(start_block) => start_block,
            None => {
                let end_ts = self
                    .retry
                    .run("block timestamp", || explorer.block_timestamp(end_block))
                    .await
                    .map_err(retried)?;
                let cutoff = end_ts.saturating_sub(request.lookback_secs());
                self.retry
                    .run("block by timestamp", || explorer.block_at_or_after(cutoff))
                    .await
                    .map_err(retried)?
                    .min(end_block)
            }
        };

        Ok(Window {
            start_block,
            end_block,
            resolved_via: WindowSource::Explorer,
        })
    }
}

/// Binary search for the block whose timestamp is closest to `cutoff`, within
/// `tolerance` blocks. Ties go to the later block so the window never reaches
/// further back than asked. A cutoff before genesis gives block 0.
pub async fn search_block_at<C: ChainClock>(
    chain: &C,
    cutoff: u64,
    end_block: u64,
    end_ts: u64,
    tolerance: u64,
) -> crate::Result<u64> {
    if cutoff >= end_ts {
        return Ok(end_block);
    }

    let (mut lo, mut lo_ts) = (0, chain.block_timestamp(0).await?);
    if cutoff <= lo_ts {
        return Ok(0);
    }
    let (mut hi, mut hi_ts) = (end_block, end_ts);

    // lo_ts < cutoff <= hi_ts
    let tolerance = tolerance.max(1);
    while hi - lo > tolerance {
        let mid = lo + (hi - lo) / 2;
        let mid_ts = chain.block_timestamp(mid).await?;
        debug!(lo, hi, mid, mid_ts, cutoff, "window search step");
        if mid_ts < cutoff {
            (lo, lo_ts) = (mid, mid_ts);
        } else {
            (hi, hi_ts) = (mid, mid_ts);
        }
    }

    if cutoff - lo_ts < hi_ts - cutoff {
        Ok(lo)
    } else {
        Ok(hi)
    }
}
