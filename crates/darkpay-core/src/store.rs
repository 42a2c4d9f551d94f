// ─────────────────────────────────────────────────────────────────
// Balance Store: token custody behind the reward ledger
// ─────────────────────────────────────────────────────────────────
// total     = every unit the store holds for a token
// available = total − locked; the pool a cycle may draw from
// locked    = committed rewards (darknode pool + community pool) plus
//             legacy per-node balances carried from the flat-balance scheme
// ─────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, RewardsError};
use crate::{Address, Amount, TokenId};

/// Custody layer consumed by `ClaimlessRewards`.
///
/// The ledger checks every amount against `available_balance` and
/// `total_balance` before it calls `commit` or `transfer`. Implementations
/// must not fail those calls when the amounts fit.
pub trait BalanceStore {
    fn total_balance(&self, token: &str) -> Amount;

    fn available_balance(&self, token: &str) -> Amount;

    /// Credit incoming fees as available funds.
    fn deposit(&mut self, token: &str, amount: Amount) -> Result<()>;

    /// Move `amount` from available to locked.
    fn commit(&mut self, token: &str, amount: Amount) -> Result<()>;

    /// Pay `amount` of locked funds out to `recipient`.
    fn transfer(&mut self, token: &str, recipient: &str, amount: Amount) -> Result<()>;

    fn legacy_balance(&self, node: &str, token: &str) -> Amount;

    /// Read the legacy balance and zero it. A second call returns 0.
    fn take_legacy_balance(&mut self, node: &str, token: &str) -> Amount;

    /// Sum of all outstanding legacy balances for `token`.
    fn total_legacy(&self, token: &str) -> Amount;
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenBalance {
    pub total: Amount,
    pub locked: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct InMemoryStore {
    balances: BTreeMap<TokenId, TokenBalance>,
    /// node → token → legacy amount (already counted in `locked`)
    legacy: BTreeMap<Address, BTreeMap<TokenId, Amount>>,
    /// recipient → token → amount paid out by `transfer`
    paid: BTreeMap<Address, BTreeMap<TokenId, Amount>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a balance from the predecessor scheme. The funds are added to the
    /// store as locked, so they can never be drawn into a cycle.
    pub fn seed_legacy_balance(&mut self, node: &str, token: &str, amount: Amount) -> Result<()> {
        let entry = self.balances.entry(token.to_string()).or_default();
        let total = entry
            .total
            .checked_add(amount)
            .ok_or(RewardsError::ArithmeticOverflow("store total"))?;
        let locked = entry
            .locked
            .checked_add(amount)
            .ok_or(RewardsError::ArithmeticOverflow("store locked"))?;
        let slot = self
            .legacy
            .entry(node.to_string())
            .or_default()
            .entry(token.to_string())
            .or_insert(0);
        *slot = slot
            .checked_add(amount)
            .ok_or(RewardsError::ArithmeticOverflow("legacy balance"))?;
        entry.total = total;
        entry.locked = locked;
        Ok(())
    }

    pub fn locked_balance(&self, token: &str) -> Amount {
        self.balances.get(token).map(|b| b.locked).unwrap_or(0)
    }

    /// Total amount `recipient` has received from this store.
    pub fn paid_to(&self, recipient: &str, token: &str) -> Amount {
        self.paid
            .get(recipient)
            .and_then(|m| m.get(token))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of all payouts for `token`.
    pub fn total_paid(&self, token: &str) -> Amount {
        self.paid
            .values()
            .filter_map(|m| m.get(token))
            .fold(0u128, |acc, v| acc.saturating_add(*v))
    }
}

impl BalanceStore for InMemoryStore {
    fn total_balance(&self, token: &str) -> Amount {
        self.balances.get(token).map(|b| b.total).unwrap_or(0)
    }

    fn available_balance(&self, token: &str) -> Amount {
        self.balances
            .get(token)
            .map(|b| b.total.saturating_sub(b.locked))
            .unwrap_or(0)
    }

    fn deposit(&mut self, token: &str, amount: Amount) -> Result<()> {
        let entry = self.balances.entry(token.to_string()).or_default();
        entry.total = entry
            .total
            .checked_add(amount)
            .ok_or(RewardsError::ArithmeticOverflow("store total"))?;
        Ok(())
    }

    fn commit(&mut self, token: &str, amount: Amount) -> Result<()> {
        let available = self.available_balance(token);
        if amount > available {
            return Err(RewardsError::InsufficientAvailable {
                token: token.to_string(),
                available,
                requested: amount,
            });
        }
        if amount == 0 {
            return Ok(());
        }
        let entry = self.balances.entry(token.to_string()).or_default();
        entry.locked = entry
            .locked
            .checked_add(amount)
            .ok_or(RewardsError::ArithmeticOverflow("store locked"))?;
        Ok(())
    }

    fn transfer(&mut self, token: &str, recipient: &str, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let locked = self.locked_balance(token);
        if amount > locked {
            return Err(RewardsError::InsufficientLocked {
                token: token.to_string(),
                locked,
                requested: amount,
            });
        }
        let paid = self
            .paid
            .entry(recipient.to_string())
            .or_default()
            .entry(token.to_string())
            .or_insert(0);
        *paid = paid
            .checked_add(amount)
            .ok_or(RewardsError::ArithmeticOverflow("paid out"))?;
        let entry = self.balances.entry(token.to_string()).or_default();
        // amount <= locked <= total
        entry.locked -= amount;
        entry.total -= amount;
        Ok(())
    }

    fn legacy_balance(&self, node: &str, token: &str) -> Amount {
        self.legacy
            .get(node)
            .and_then(|m| m.get(token))
            .copied()
            .unwrap_or(0)
    }

    fn take_legacy_balance(&mut self, node: &str, token: &str) -> Amount {
        self.legacy
            .get_mut(node)
            .and_then(|m| m.remove(token))
            .unwrap_or(0)
    }

    fn total_legacy(&self, token: &str) -> Amount {
        self.legacy
            .values()
            .filter_map(|m| m.get(token))
            .fold(0u128, |acc, v| acc.saturating_add(*v))
    }
}
