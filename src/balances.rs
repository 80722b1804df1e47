//! Address-keyed running totals rebuilt purely from in-window transfers.
//!
//! Reconstruction starts from zero, so an address that only sends inside the
//! window ends up negative. That reflects holdings from before the window and
//! is not an error.

use std::collections::HashMap;

use alloy::primitives::{Address, I256, U256};

use crate::transfer::{sort_for_replay, TransferEvent};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BalanceMap {
    balances: HashMap<Address, I256>,
}

impl BalanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `address`, zero when the address never appeared.
    pub fn get(&self, address: &Address) -> I256 {
        self.balances.get(address).copied().unwrap_or(I256::ZERO)
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &I256)> {
        self.balances.iter()
    }

    /// Debits the sender and credits the receiver. Mint and burn addresses
    /// are treated like any other address.
    pub fn apply(&mut self, transfer: &TransferEvent) -> crate::Result<()> {
        let overflow = |address| crate::Error::BalanceOverflow {
            address,
            value: transfer.value,
        };
        let value = I256::try_from(transfer.value).map_err(|_| overflow(transfer.from))?;

        let from = self
            .get(&transfer.from)
            .checked_sub(value)
            .ok_or_else(|| overflow(transfer.from))?;
        self.balances.insert(transfer.from, from);

        let to = self
            .get(&transfer.to)
            .checked_add(value)
            .ok_or_else(|| overflow(transfer.to))?;
        self.balances.insert(transfer.to, to);

        Ok(())
    }

    /// Applies events in the order given.
    pub fn apply_all<'a>(
        &mut self,
        transfers: impl IntoIterator<Item = &'a TransferEvent>,
    ) -> crate::Result<()> {
        for transfer in transfers {
            self.apply(transfer)?;
        }
        Ok(())
    }

    /// Sorts the events into `(block_number, log_index)` order and replays them.
    pub fn replay(mut transfers: Vec<TransferEvent>) -> crate::Result<Self> {
        sort_for_replay(&mut transfers);
        let mut balances = Self::new();
        balances.apply_all(&transfers)?;
        Ok(balances)
    }

    /// Snapshot after every event up to and including `block_number`.
    /// `transfers` must already be in replay order.
    pub fn replay_until(transfers: &[TransferEvent], block_number: u64) -> crate::Result<Self> {
        let mut balances = Self::new();
        balances.apply_all(
            transfers
                .iter()
                .take_while(|transfer| transfer.block_number <= block_number),
        )?;
        Ok(balances)
    }

    /// Sum over every tracked address. Always zero for a consistent replay.
    pub fn net_total(&self) -> Option<I256> {
        self.balances
            .values()
            .try_fold(I256::ZERO, |acc, balance| acc.checked_add(*balance))
    }

    /// Total of all positive balances, ignoring `exclude`.
    pub fn positive_total(&self, exclude: &[Address]) -> U256 {
        self.balances
            .iter()
            .filter(|(address, balance)| balance.is_positive() && !exclude.contains(*address))
            .fold(U256::ZERO, |acc, (_, balance)| {
                acc.saturating_add(balance.into_raw())
            })
    }
}
