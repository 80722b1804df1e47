//! Pages through every transfer of a token inside a block window and replays
//! them into a [`BalanceMap`].

use alloy::primitives::Address;
use tracing::{debug, info};

use crate::{
    balances::BalanceMap,
    rate_limit::RateGate,
    retry::{RetryExhausted, RetryPolicy},
    sources::TransferSource,
    transfer::{sort_for_replay, TransferEvent},
};

/// Result of a complete pass over the window.
#[derive(Clone, Debug)]
pub struct Reconstruction {
    pub balances: BalanceMap,
    /// Every in-window event, in replay order.
    pub events: Vec<TransferEvent>,
    /// Page requests that succeeded, rebased queries included.
    pub pages: u64,
}

impl Reconstruction {
    /// Balances as they stood after `block_number`.
    pub fn snapshot(&self, block_number: u64) -> crate::Result<BalanceMap> {
        BalanceMap::replay_until(&self.events, block_number)
    }
}

pub struct BalanceReconstructor<S> {
    source: S,
    gate: RateGate,
    retry: RetryPolicy,
    page_size: u64,
    max_result_window: u64,
}

impl<S: TransferSource> BalanceReconstructor<S> {
    pub fn new(
        source: S,
        gate: RateGate,
        retry: RetryPolicy,
        page_size: u64,
        max_result_window: u64,
    ) -> Self {
        let page_size = page_size.max(1);
        Self {
            source,
            gate,
            retry,
            page_size,
            max_result_window: max_result_window.max(page_size),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetches and replays every transfer with `start_block <= block <= end_block`.
    /// Any page that cannot be fetched aborts the whole run.
    pub async fn reconstruct(
        &self,
        contract: Address,
        start_block: u64,
        end_block: u64,
    ) -> crate::Result<Reconstruction> {
        if start_block > end_block {
            return Err(crate::Error::InvalidWindow {
                start_block,
                end_block,
            });
        }

        let (events, pages) = self.fetch_all(contract, start_block, end_block).await?;

        let mut balances = BalanceMap::new();
        balances.apply_all(&events)?;
        info!(
            events = events.len(),
            pages,
            addresses = balances.len(),
            "reconstructed balances"
        );

        Ok(Reconstruction {
            balances,
            events,
            pages,
        })
    }

    async fn fetch_all(
        &self,
        contract: Address,
        start_block: u64,
        end_block: u64,
    ) -> crate::Result<(Vec<TransferEvent>, u64)> {
        let mut events = Vec::new();
        let mut cursor = start_block;
        let mut page = 1;
        let mut requests = 0;

        loop {
            requests += 1;
            let records = self
                .fetch_page(contract, cursor, end_block, page, requests)
                .await?;

            let received = records.len() as u64;
            let past_end = records.iter().any(|event| event.block_number > end_block);
            events.extend(
                records
                    .into_iter()
                    .filter(|event| event.is_within(start_block, end_block)),
            );
            info!(
                page = requests,
                received,
                total = events.len(),
                "fetched transfer page"
            );

            if received < self.page_size || past_end {
                break;
            }

            if (page + 1).saturating_mul(self.page_size) > self.max_result_window {
                cursor = self.rebase(&mut events, cursor, requests)?;
                page = 1;
            } else {
                page += 1;
            }
        }

        sort_for_replay(&mut events);
        Ok((events, requests))
    }

    async fn fetch_page(
        &self,
        contract: Address,
        cursor: u64,
        end_block: u64,
        page: u64,
        request: u64,
    ) -> crate::Result<Vec<TransferEvent>> {
        let (source, gate, page_size) = (&self.source, &self.gate, self.page_size);
        self.retry
            .run("transfer page", || async move {
                gate.wait().await;
                source
                    .transfers(contract, cursor, end_block, page, page_size)
                    .await
            })
            .await
            .map_err(|RetryExhausted { attempts, error }| crate::Error::DataSource {
                page: request,
                attempts,
                source: Box::new(error),
            })
    }

    /// Restarts the query at the highest block seen so far, dropping that
    /// block's events since they are fetched again from page 1.
    fn rebase(
        &self,
        events: &mut Vec<TransferEvent>,
        cursor: u64,
        request: u64,
    ) -> crate::Result<u64> {
        let highest = events.iter().map(|event| event.block_number).max();
        match highest {
            Some(highest) if highest > cursor => {
                events.retain(|event| event.block_number < highest);
                debug!(from = cursor, to = highest, "result window full, rebasing query");
                Ok(highest)
            }
            _ => Err(crate::Error::DataSource {
                page: request,
                attempts: 1,
                source: Box::new(crate::Error::ResultWindowExhausted {
                    block: cursor,
                    window: self.max_result_window,
                }),
            }),
        }
    }
}
