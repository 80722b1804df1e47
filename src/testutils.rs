use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    time::Duration,
};

use alloy::primitives::Address;

use crate::{
    sources::{BlockIndex, ChainClock, TransferSource},
    transfer::TransferEvent,
    Error,
};

pub const GENESIS_TS: u64 = 1_438_269_973;

pub fn timeout() -> Error {
    Error::Timeout(Duration::from_secs(30))
}

pub fn rate_limited() -> Error {
    Error::RateLimitExceeded("Max rate limit reached".into())
}

/// A chain producing one block every `block_time` seconds from genesis.
pub struct MockChain {
    pub head: u64,
    pub block_time: u64,
    /// When set, every call fails with a fresh error from this constructor.
    pub fail_with: Option<fn() -> Error>,
    pub calls: Cell<u32>,
}

impl MockChain {
    pub fn new(head: u64, block_time: u64) -> Self {
        Self {
            head,
            block_time,
            fail_with: None,
            calls: Cell::new(0),
        }
    }

    pub fn failing(fail_with: fn() -> Error) -> Self {
        Self {
            fail_with: Some(fail_with),
            ..Self::new(0, 12)
        }
    }

    pub fn timestamp_of(&self, block: u64) -> u64 {
        GENESIS_TS + block * self.block_time
    }

    fn check(&self) -> crate::Result<()> {
        self.calls.set(self.calls.get() + 1);
        match self.fail_with {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }
}

impl ChainClock for MockChain {
    async fn latest_block(&self) -> crate::Result<u64> {
        self.check()?;
        Ok(self.head)
    }

    async fn block_timestamp(&self, block: u64) -> crate::Result<u64> {
        self.check()?;
        if block > self.head {
            return Err(Error::BlockNotFound(block));
        }
        Ok(self.timestamp_of(block))
    }
}

/// Explorer double: answers block lookups from a fixed block time and serves
/// `events` in pages the way `tokentx` does.
#[derive(Default)]
pub struct MockExplorer {
    pub head: u64,
    pub block_time: u64,
    pub events: Vec<TransferEvent>,
    /// Errors returned, one per call, before any request is served.
    pub failures: RefCell<VecDeque<Error>>,
    /// Serve records past `end_block` as a source without server-side
    /// filtering would.
    pub ignore_end_block: bool,
    /// Reverse each page to check ordering does not depend on the source.
    pub reverse_pages: bool,
    /// `(start_block, end_block, page, page_size)` of every transfer request.
    pub requests: RefCell<Vec<(u64, u64, u64, u64)>>,
}

impl MockExplorer {
    pub fn new(head: u64, block_time: u64) -> Self {
        Self {
            head,
            block_time,
            ..Default::default()
        }
    }

    pub fn with_events(mut self, events: Vec<TransferEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn fail_next(&self, errors: impl IntoIterator<Item = Error>) {
        self.failures.borrow_mut().extend(errors);
    }

    fn next_failure(&self) -> crate::Result<()> {
        match self.failures.borrow_mut().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl BlockIndex for MockExplorer {
    async fn latest_block(&self) -> crate::Result<u64> {
        self.next_failure()?;
        Ok(self.head)
    }

    async fn block_timestamp(&self, block: u64) -> crate::Result<u64> {
        self.next_failure()?;
        Ok(GENESIS_TS + block * self.block_time)
    }

    async fn block_at_or_after(&self, timestamp: u64) -> crate::Result<u64> {
        self.next_failure()?;
        let since = timestamp.saturating_sub(GENESIS_TS);
        Ok(since.div_ceil(self.block_time))
    }
}

impl TransferSource for MockExplorer {
    async fn transfers(
        &self,
        _contract: Address,
        start_block: u64,
        end_block: u64,
        page: u64,
        page_size: u64,
    ) -> crate::Result<Vec<TransferEvent>> {
        self.requests
            .borrow_mut()
            .push((start_block, end_block, page, page_size));
        self.next_failure()?;

        let mut matching: Vec<TransferEvent> = self
            .events
            .iter()
            .filter(|event| {
                event.block_number >= start_block
                    && (self.ignore_end_block || event.block_number <= end_block)
            })
            .cloned()
            .collect();
        matching.sort_by_key(TransferEvent::order_key);

        let skip = ((page - 1) * page_size) as usize;
        let mut served: Vec<TransferEvent> = matching
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .collect();
        if self.reverse_pages {
            served.reverse();
        }
        Ok(served)
    }
}
