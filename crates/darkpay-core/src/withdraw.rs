// ─────────────────────────────────────────────────────────────────
// Withdrawal Engine: lazy per-node settlement
// ─────────────────────────────────────────────────────────────────
// owed = share(upper) − share(lower) + legacy balance
//
// lower: last claimed checkpoint, or the first epoch at/after registration
//        when the pointer predates the current registration
// upper: latest cycle, capped at the first epoch at/after deregistration
//        once that epoch has happened
//
// The pointer only moves forward. A second withdrawal with no rollover in
// between pays 0.
// ─────────────────────────────────────────────────────────────────

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, RewardsError};
use crate::events::RewardsEvent;
use crate::rewards::ClaimlessRewards;
use crate::store::BalanceStore;
use crate::{Address, Amount, Timestamp, TokenId};

/// What a darknode is owed for one token, before anything is moved.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub node: Address,
    pub token: TokenId,
    pub lower: Timestamp,
    pub upper: Timestamp,
    /// Checkpoint difference over (lower, upper].
    pub accrued: Amount,
    /// Balance carried over from the flat-balance scheme.
    pub legacy: Amount,
}

impl Claim {
    pub fn total(&self) -> Result<Amount> {
        self.accrued
            .checked_add(self.legacy)
            .ok_or(RewardsError::ArithmeticOverflow("claim total"))
    }
}

/// A checked claim and who it pays, ready to apply.
#[derive(Debug, Clone)]
struct Payout {
    claim: Claim,
    recipient: Address,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Withdrawal {
    pub node: Address,
    pub token: TokenId,
    pub amount: Amount,
    pub recipient: Address,
}

impl<S: BalanceStore> ClaimlessRewards<S> {
    /// Compute the claim for `(node, token)` without changing anything.
    pub fn claim(&self, node: &str, token: &str) -> Result<Claim> {
        if node == self.state.config.community_fund {
            return Err(RewardsError::InvalidNodeId);
        }
        if self.registry.operator_of(node).is_none() {
            return Err(RewardsError::NotOperator {
                node: node.to_string(),
            });
        }

        let registered_at = self.registry.registered_at(node);
        let last = self.last_claimed(node, token);
        let lower = if last < registered_at {
            self.next_epoch_from(registered_at)
                .ok_or_else(|| RewardsError::RegistrationPending {
                    node: node.to_string(),
                })?
        } else {
            last
        };

        let deregistered_at = self.registry.deregistered_at(node);
        let upper = if deregistered_at != 0 {
            self.next_epoch_from(deregistered_at)
                .unwrap_or(self.state.latest_cycle)
        } else {
            self.state.latest_cycle
        };

        Ok(Claim {
            node: node.to_string(),
            token: token.to_string(),
            lower,
            upper,
            accrued: self.state.shares.difference(token, lower, upper)?,
            legacy: self.store.legacy_balance(node, token),
        })
    }

    /// Amount `withdraw` would currently pay for `(node, token)`.
    pub fn darknode_balance(&self, node: &str, token: &str) -> Result<Amount> {
        self.claim(node, token)?.total()
    }

    pub fn withdraw(&mut self, caller: &str, node: &str, token: &str) -> Result<Amount> {
        let payout = self.plan_withdrawal(caller, node, token)?;
        self.check_payouts(std::slice::from_ref(&payout))?;
        self.apply_withdrawal(payout).map(|w| w.amount)
    }

    /// Withdraw one token for several darknodes. All or nothing.
    pub fn withdraw_token(
        &mut self,
        caller: &str,
        nodes: &[Address],
        token: &str,
    ) -> Result<Vec<Withdrawal>> {
        let pairs = nodes.iter().map(|node| (node.as_str(), token));
        self.withdraw_batch(caller, pairs)
    }

    /// Withdraw every listed token for every listed darknode. All or nothing.
    pub fn withdraw_multiple(
        &mut self,
        caller: &str,
        nodes: &[Address],
        tokens: &[TokenId],
    ) -> Result<Vec<Withdrawal>> {
        let pairs = nodes
            .iter()
            .flat_map(move |node| tokens.iter().map(move |token| (node.as_str(), token.as_str())));
        self.withdraw_batch(caller, pairs)
    }

    fn withdraw_batch<'a>(
        &mut self,
        caller: &str,
        pairs: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> Result<Vec<Withdrawal>> {
        let mut seen = BTreeSet::new();
        let mut payouts = Vec::new();
        for (node, token) in pairs {
            let mut payout = self.plan_withdrawal(caller, node, token)?;
            if !seen.insert((node, token)) {
                // Settled earlier in this batch.
                payout.claim.accrued = 0;
                payout.claim.legacy = 0;
            }
            payouts.push(payout);
        }
        self.check_payouts(&payouts)?;
        payouts
            .into_iter()
            .map(|payout| self.apply_withdrawal(payout))
            .collect()
    }

    fn plan_withdrawal(&self, caller: &str, node: &str, token: &str) -> Result<Payout> {
        if node == self.state.config.community_fund {
            return Err(RewardsError::InvalidNodeId);
        }
        let recipient = self
            .registry
            .operator_of(node)
            .filter(|op| op == caller)
            .ok_or_else(|| RewardsError::NotOperator {
                node: node.to_string(),
            })?;
        let claim = self.claim(node, token)?;
        claim.total()?;
        Ok(Payout { claim, recipient })
    }

    /// Per token, the darknode pool must cover the accrued parts and the
    /// store's locked funds must cover the whole payout.
    fn check_payouts(&self, payouts: &[Payout]) -> Result<()> {
        let mut totals: BTreeMap<&str, (Amount, Amount)> = BTreeMap::new();
        for payout in payouts {
            let (accrued, amount) = totals.entry(payout.claim.token.as_str()).or_default();
            *accrued = accrued
                .checked_add(payout.claim.accrued)
                .ok_or(RewardsError::ArithmeticOverflow("batch accrued"))?;
            *amount = amount
                .checked_add(payout.claim.total()?)
                .ok_or(RewardsError::ArithmeticOverflow("batch amount"))?;
        }
        for (token, (accrued, amount)) in totals {
            if accrued > self.darknode_pool(token) {
                return Err(RewardsError::ArithmeticUnderflow("darknode pool"));
            }
            self.check_locked(token, amount)?;
        }
        Ok(())
    }

    fn check_locked(&self, token: &str, amount: Amount) -> Result<()> {
        let locked = self
            .store
            .total_balance(token)
            .saturating_sub(self.store.available_balance(token));
        if amount > locked {
            return Err(RewardsError::InsufficientLocked {
                token: token.to_string(),
                locked,
                requested: amount,
            });
        }
        Ok(())
    }

    fn apply_withdrawal(&mut self, payout: Payout) -> Result<Withdrawal> {
        let Payout { claim, recipient } = payout;
        let node = claim.node.as_str();
        let token = claim.token.as_str();
        let amount = claim.total()?;

        self.store.transfer(token, &recipient, amount)?;
        if claim.legacy > 0 {
            self.store.take_legacy_balance(node, token);
        }
        if claim.accrued > 0 {
            let pool = self.state.darknode_pool.entry(token.to_string()).or_insert(0);
            *pool = pool
                .checked_sub(claim.accrued)
                .ok_or(RewardsError::ArithmeticUnderflow("darknode pool"))?;
        }
        if claim.upper > self.last_claimed(node, token) {
            self.state
                .last_claimed
                .entry(node.to_string())
                .or_default()
                .insert(token.to_string(), claim.upper);
        }

        if amount > 0 {
            info!(
                "Darknode {} withdrew {} {} to {} (checkpoints {}..{}, legacy {})",
                node, amount, token, recipient, claim.lower, claim.upper, claim.legacy
            );
        }
        self.events.push(RewardsEvent::DarknodeWithdrew {
            node: node.to_string(),
            token: token.to_string(),
            amount,
            recipient: recipient.clone(),
        });
        Ok(Withdrawal {
            node: claim.node,
            token: claim.token,
            amount,
            recipient,
        })
    }

    // ─────────────────────────────────────────────────────────────────
    // Community fund
    // ─────────────────────────────────────────────────────────────────

    pub fn community_fund_balance(&self, token: &str) -> Result<Amount> {
        let last = self.state.community_claimed.get(token).copied().unwrap_or(0);
        self.state
            .community
            .difference(token, last, self.state.latest_cycle)
    }

    /// Pay the accrued community cut of each token to the current fund
    /// address. Callable by anyone.
    pub fn withdraw_to_community_fund(&mut self, tokens: &[TokenId]) -> Result<Vec<Withdrawal>> {
        let recipient = self.state.config.community_fund.clone();

        let mut amounts: BTreeMap<&str, Amount> = BTreeMap::new();
        for token in tokens {
            if !amounts.contains_key(token.as_str()) {
                amounts.insert(token.as_str(), self.community_fund_balance(token)?);
            }
        }
        for (token, amount) in &amounts {
            if *amount > self.community_pool(token) {
                return Err(RewardsError::ArithmeticUnderflow("community pool"));
            }
            self.check_locked(token, *amount)?;
        }

        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            // A repeated token pays 0 the second time.
            let amount = amounts.insert(token.as_str(), 0).unwrap_or(0);
            self.store.transfer(token, &recipient, amount)?;
            if amount > 0 {
                let pool = self.state.community_pool.entry(token.clone()).or_insert(0);
                *pool = pool
                    .checked_sub(amount)
                    .ok_or(RewardsError::ArithmeticUnderflow("community pool"))?;
                info!("Community fund {} withdrew {} {}", recipient, amount, token);
            }
            self.state
                .community_claimed
                .insert(token.clone(), self.state.latest_cycle);
            self.events.push(RewardsEvent::CommunityFundWithdrew {
                token: token.clone(),
                amount,
                recipient: recipient.clone(),
            });
            out.push(Withdrawal {
                node: recipient.clone(),
                token: token.clone(),
                amount,
                recipient: recipient.clone(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::store::InMemoryStore;
    use crate::{RewardsConfig, CYCLE_UNIT_SECS};
    use std::sync::Arc;

    const GENESIS: Timestamp = 1_700_000_000;
    const HOUR: Timestamp = CYCLE_UNIT_SECS;

    fn deploy() -> (Arc<InMemoryRegistry>, ClaimlessRewards<InMemoryStore>) {
        let registry = Arc::new(InMemoryRegistry::new("dnr", GENESIS));
        let mut config = RewardsConfig::new("owner", "community");
        config.hourly_withheld_numerator = 0;
        config.community_fund_numerator = 0;
        let mut rewards =
            ClaimlessRewards::new(config, registry.clone(), InMemoryStore::new(), GENESIS).unwrap();
        rewards.register_token("owner", "DAI").unwrap();
        (registry, rewards)
    }

    /// Forced rollover first, then the registry applies the epoch.
    fn epoch(registry: &InMemoryRegistry, rewards: &mut ClaimlessRewards<InMemoryStore>, now: Timestamp) {
        rewards.on_epoch("dnr", now).unwrap();
        registry.epoch(now).unwrap();
    }

    #[test]
    fn test_withdraw_is_idempotent() {
        let (registry, mut rewards) = deploy();
        registry.register("dn1", "op1", GENESIS).unwrap();
        rewards.deposit("DAI", 1_000).unwrap();
        rewards.change_cycle(GENESIS + HOUR).unwrap();

        assert_eq!(rewards.darknode_balance("dn1", "DAI").unwrap(), 1_000);
        assert_eq!(rewards.withdraw("op1", "dn1", "DAI").unwrap(), 1_000);
        assert_eq!(rewards.withdraw("op1", "dn1", "DAI").unwrap(), 0);
        assert_eq!(rewards.store().paid_to("op1", "DAI"), 1_000);
        assert_eq!(rewards.last_claimed("dn1", "DAI"), GENESIS + HOUR);
        rewards.audit("DAI").unwrap();
    }

    #[test]
    fn test_withdraw_rejections() {
        let (registry, mut rewards) = deploy();
        registry.register("dn1", "op1", GENESIS + 5).unwrap();

        assert_eq!(
            rewards.withdraw("op1", "community", "DAI").unwrap_err(),
            RewardsError::InvalidNodeId
        );
        assert_eq!(
            rewards.withdraw("op2", "dn1", "DAI").unwrap_err().code(),
            "not_operator"
        );
        assert_eq!(
            rewards.withdraw("op1", "dn9", "DAI").unwrap_err().code(),
            "not_operator"
        );
        // Registered after genesis, no epoch since.
        assert_eq!(
            rewards.withdraw("op1", "dn1", "DAI").unwrap_err().code(),
            "registration_pending"
        );

        epoch(&registry, &mut rewards, GENESIS + 100);
        assert_eq!(rewards.withdraw("op1", "dn1", "DAI").unwrap(), 0);
    }

    #[test]
    fn test_pending_registration_does_not_accrue() {
        let (registry, mut rewards) = deploy();
        registry.register("dn1", "op1", GENESIS).unwrap();
        registry.register("dn2", "op2", GENESIS + 10).unwrap();

        rewards.deposit("DAI", 1_000).unwrap();
        epoch(&registry, &mut rewards, GENESIS + HOUR);
        // Only dn1 was live for the period that just ended.
        assert_eq!(rewards.darknode_balance("dn1", "DAI").unwrap(), 1_000);
        assert_eq!(rewards.darknode_balance("dn2", "DAI").unwrap(), 0);

        rewards.deposit("DAI", 1_000).unwrap();
        rewards.change_cycle(GENESIS + 2 * HOUR).unwrap();
        assert_eq!(rewards.darknode_balance("dn1", "DAI").unwrap(), 1_500);
        assert_eq!(rewards.darknode_balance("dn2", "DAI").unwrap(), 500);
    }

    #[test]
    fn test_deregistered_node_stops_accruing() {
        let (registry, mut rewards) = deploy();
        registry.register("dn1", "op1", GENESIS).unwrap();
        registry.register("dn2", "op2", GENESIS).unwrap();

        rewards.deposit("DAI", 1_000).unwrap();
        rewards.change_cycle(GENESIS + HOUR).unwrap();
        registry.deregister("dn1", GENESIS + HOUR + 1).unwrap();

        // Deregistration pending: still live until the epoch.
        rewards.deposit("DAI", 1_000).unwrap();
        epoch(&registry, &mut rewards, GENESIS + 2 * HOUR);
        rewards.deposit("DAI", 1_000).unwrap();
        rewards.change_cycle(GENESIS + 3 * HOUR).unwrap();

        assert_eq!(rewards.darknode_balance("dn1", "DAI").unwrap(), 1_000);
        assert_eq!(rewards.darknode_balance("dn2", "DAI").unwrap(), 2_000);
    }

    #[test]
    fn test_legacy_balance_merged_once() {
        let (registry, _) = deploy();
        let mut store = InMemoryStore::new();
        store.seed_legacy_balance("dn1", "DAI", 42).unwrap();
        let mut config = RewardsConfig::new("owner", "community");
        config.hourly_withheld_numerator = 0;
        let mut rewards =
            ClaimlessRewards::new(config, registry.clone(), store, GENESIS).unwrap();
        registry.register("dn1", "op1", GENESIS).unwrap();

        assert_eq!(rewards.darknode_balance("dn1", "DAI").unwrap(), 42);
        assert_eq!(rewards.withdraw("op1", "dn1", "DAI").unwrap(), 42);
        assert_eq!(rewards.withdraw("op1", "dn1", "DAI").unwrap(), 0);
        assert_eq!(rewards.store().legacy_balance("dn1", "DAI"), 0);
        rewards.audit("DAI").unwrap();
    }

    #[test]
    fn test_batch_failure_applies_nothing() {
        let (registry, mut rewards) = deploy();
        registry.register("dn1", "op1", GENESIS).unwrap();
        registry.register("dn2", "op2", GENESIS).unwrap();
        rewards.deposit("DAI", 1_000).unwrap();
        rewards.change_cycle(GENESIS + HOUR).unwrap();

        let nodes = vec!["dn1".to_string(), "dn2".to_string()];
        let err = rewards.withdraw_token("op1", &nodes, "DAI").unwrap_err();
        assert_eq!(err.code(), "not_operator");
        assert_eq!(rewards.store().paid_to("op1", "DAI"), 0);
        assert_eq!(rewards.last_claimed("dn1", "DAI"), 0);
    }

    #[test]
    fn test_batch_repeated_pair_pays_once() {
        let (registry, _) = deploy();
        let mut store = InMemoryStore::new();
        store.seed_legacy_balance("dn1", "DAI", 5).unwrap();
        let mut config = RewardsConfig::new("owner", "community");
        config.hourly_withheld_numerator = 0;
        config.community_fund_numerator = 0;
        let mut rewards =
            ClaimlessRewards::new(config, registry.clone(), store, GENESIS).unwrap();
        rewards.register_token("owner", "DAI").unwrap();
        registry.register("dn1", "op1", GENESIS).unwrap();
        rewards.deposit("DAI", 1_000).unwrap();
        rewards.change_cycle(GENESIS + HOUR).unwrap();

        let nodes = vec!["dn1".to_string(), "dn1".to_string()];
        let paid = rewards.withdraw_token("op1", &nodes, "DAI").unwrap();
        assert_eq!(paid.iter().map(|w| w.amount).collect::<Vec<_>>(), vec![1_005, 0]);
        assert_eq!(rewards.store().paid_to("op1", "DAI"), 1_005);
        assert_eq!(rewards.darknode_pool("DAI"), 0);
        rewards.audit("DAI").unwrap();
    }

    #[test]
    fn test_community_repeated_token_pays_once() {
        let (registry, mut rewards) = deploy();
        rewards.update_community_fund_numerator("owner", 100_000).unwrap();
        registry.register("dn1", "op1", GENESIS).unwrap();
        rewards.deposit("DAI", 1_000).unwrap();
        rewards.change_cycle(GENESIS + HOUR).unwrap();

        let tokens = vec!["DAI".to_string(), "DAI".to_string()];
        let paid = rewards.withdraw_to_community_fund(&tokens).unwrap();
        assert_eq!(paid[0].amount, 100);
        assert_eq!(paid[1].amount, 0);
        assert_eq!(rewards.store().paid_to("community", "DAI"), 100);
        rewards.audit("DAI").unwrap();
    }

    #[test]
    fn test_community_fund_withdrawal_follows_address() {
        let (registry, mut rewards) = deploy();
        rewards.update_community_fund_numerator("owner", 100_000).unwrap();
        registry.register("dn1", "op1", GENESIS).unwrap();
        rewards.deposit("DAI", 1_000).unwrap();
        rewards.change_cycle(GENESIS + HOUR).unwrap();

        assert_eq!(rewards.community_fund_balance("DAI").unwrap(), 100);
        rewards.update_community_fund("owner", "treasury").unwrap();
        let paid = rewards
            .withdraw_to_community_fund(&["DAI".to_string()])
            .unwrap();
        assert_eq!(paid[0].amount, 100);
        assert_eq!(paid[0].recipient, "treasury");
        assert_eq!(rewards.store().paid_to("treasury", "DAI"), 100);
        assert_eq!(rewards.community_fund_balance("DAI").unwrap(), 0);
        assert_eq!(
            rewards.withdraw_to_community_fund(&["DAI".to_string()]).unwrap()[0].amount,
            0
        );
        rewards.audit("DAI").unwrap();
    }
}
