use std::cmp::Ordering;

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

/// A single ERC-20 `Transfer` log, as reported by the event source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: TxHash,
}

impl TransferEvent {
    /// Replay position of the event within the chain.
    pub fn order_key(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    pub fn is_within(&self, start_block: u64, end_block: u64) -> bool {
        (start_block..=end_block).contains(&self.block_number)
    }
}

impl PartialOrd for TransferEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TransferEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key()
            .cmp(&other.order_key())
            .then_with(|| self.transaction_hash.cmp(&other.transaction_hash))
            .then_with(|| self.from.cmp(&other.from))
            .then_with(|| self.to.cmp(&other.to))
            .then_with(|| self.value.cmp(&other.value))
    }
}

/// Sorts events into replay order. Pages may arrive in any order.
pub fn sort_for_replay(events: &mut [TransferEvent]) {
    events.sort();
}
