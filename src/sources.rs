//! Seams between the core and the networks it reads from.

use alloy::primitives::Address;

use crate::transfer::TransferEvent;

/// Live chain queries, answered by an RPC node.
pub trait ChainClock {
    fn latest_block(&self) -> impl std::future::Future<Output = crate::Result<u64>>;

    /// Unix timestamp of `block`, in seconds.
    fn block_timestamp(&self, block: u64)
        -> impl std::future::Future<Output = crate::Result<u64>>;
}

/// Indexed historical lookups, answered by a block explorer.
pub trait BlockIndex {
    fn latest_block(&self) -> impl std::future::Future<Output = crate::Result<u64>>;

    fn block_timestamp(&self, block: u64)
        -> impl std::future::Future<Output = crate::Result<u64>>;

    /// First block mined at or after `timestamp`.
    fn block_at_or_after(
        &self,
        timestamp: u64,
    ) -> impl std::future::Future<Output = crate::Result<u64>>;
}

/// Paginated listing of token transfers.
pub trait TransferSource {
    /// `page` starts at 1. A page shorter than `page_size` is the last one.
    fn transfers(
        &self,
        contract: Address,
        start_block: u64,
        end_block: u64,
        page: u64,
        page_size: u64,
    ) -> impl std::future::Future<Output = crate::Result<Vec<TransferEvent>>>;
}

impl<T: TransferSource> TransferSource for &T {
    fn transfers(
        &self,
        contract: Address,
        start_block: u64,
        end_block: u64,
        page: u64,
        page_size: u64,
    ) -> impl std::future::Future<Output = crate::Result<Vec<TransferEvent>>> {
        (**self).transfers(contract, start_block, end_block, page, page_size)
    }
}
