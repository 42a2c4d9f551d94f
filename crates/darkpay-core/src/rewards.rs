// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DARKPAY - CLAIMLESS REWARDS LEDGER
//
// Owns the persisted reward state (checkpoints, claim pointers, cycle and
// epoch timestamps, token set, configuration) together with handles to the
// registration oracle and the balance store.
//
// Every public mutation runs in two phases. The first computes and checks the
// whole result against the current state without writing anything. The
// second applies it. A call that fails in the first phase leaves no trace,
// events included, and the second phase only fails if the store breaks its
// contract.
//
// Cycle logic lives in cycle.rs, withdrawal logic in withdraw.rs.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use log::info;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::checkpoint::CheckpointLedger;
use crate::error::{Result, RewardsError};
use crate::events::RewardsEvent;
use crate::registry::{RegistrationOracle, RegistryAdapter};
use crate::store::BalanceStore;
use crate::{
    is_null_address, Address, Amount, ConfigError, RewardsConfig, Timestamp, TokenId,
    NUMERATOR_DENOMINATOR,
};

/// Everything that must survive a restart.
/// BTreeMap everywhere: snapshots and `state_root` must be deterministic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RewardsState {
    pub config: RewardsConfig,
    pub registry: Address,
    pub latest_cycle: Timestamp,
    /// Cycles forced by the registry, ascending. Starts with genesis.
    pub epoch_timestamps: Vec<Timestamp>,
    /// Registration order.
    pub tokens: Vec<TokenId>,
    /// Cumulative per-darknode share.
    pub shares: CheckpointLedger,
    /// Cumulative community fund cut.
    pub community: CheckpointLedger,
    /// node → token → timestamp of the checkpoint last withdrawn up to
    #[serde(default)]
    pub last_claimed: BTreeMap<Address, BTreeMap<TokenId, Timestamp>>,
    #[serde(default)]
    pub community_claimed: BTreeMap<TokenId, Timestamp>,
    /// Committed for darknodes but not yet withdrawn.
    #[serde(default)]
    pub darknode_pool: BTreeMap<TokenId, Amount>,
    /// Committed for the community fund but not yet withdrawn.
    #[serde(default)]
    pub community_pool: BTreeMap<TokenId, Amount>,
    /// Funds sent directly to the ledger, awaiting `forward`.
    #[serde(default)]
    pub stray: BTreeMap<TokenId, Amount>,
}

/// Per-token supply audit.
/// `available + darknode_pool + community_pool + legacy == total` must hold.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenAudit {
    pub token: TokenId,
    pub available: Amount,
    pub darknode_pool: Amount,
    pub community_pool: Amount,
    pub legacy: Amount,
    pub total: Amount,
}

impl TokenAudit {
    pub fn accounted(&self) -> Option<Amount> {
        self.available
            .checked_add(self.darknode_pool)?
            .checked_add(self.community_pool)?
            .checked_add(self.legacy)
    }
}

#[derive(Debug, Clone)]
pub struct ClaimlessRewards<S: BalanceStore> {
    pub(crate) state: RewardsState,
    pub(crate) registry: RegistryAdapter,
    pub(crate) store: S,
    pub(crate) events: Vec<RewardsEvent>,
}

pub(crate) fn check_numerator(numerator: u64) -> Result<()> {
    if numerator > NUMERATOR_DENOMINATOR {
        return Err(RewardsError::InvalidNumerator {
            numerator,
            denominator: NUMERATOR_DENOMINATOR,
        });
    }
    Ok(())
}

impl<S: BalanceStore> ClaimlessRewards<S> {
    /// Deploy a fresh ledger. `genesis` becomes the first cycle and the first
    /// epoch, so darknodes registered before deployment accrue from genesis.
    /// The config is validated as given, never adjusted.
    pub fn new(
        config: RewardsConfig,
        oracle: Arc<dyn RegistrationOracle>,
        store: S,
        genesis: Timestamp,
    ) -> Result<Self> {
        let registry = RegistryAdapter::new(oracle);
        if is_null_address(&registry.address()) {
            return Err(RewardsError::InvalidRegistryAddress);
        }
        if is_null_address(&config.community_fund) {
            return Err(RewardsError::InvalidCommunityFundAddress);
        }
        if registry.is_known_darknode(&config.community_fund) {
            return Err(RewardsError::CommunityFundIsDarknode);
        }
        check_numerator(config.hourly_withheld_numerator)?;
        check_numerator(config.community_fund_numerator)?;
        config.validate().map_err(|e| match e {
            ConfigError::Invalid(reason) => RewardsError::InvalidConfig(reason),
            other => RewardsError::InvalidConfig(other.to_string()),
        })?;

        info!(
            "Claimless rewards deployed at {} (registry {}, community fund {})",
            genesis,
            registry.address(),
            config.community_fund
        );

        Ok(Self {
            state: RewardsState {
                config,
                registry: registry.address(),
                latest_cycle: genesis,
                epoch_timestamps: vec![genesis],
                tokens: Vec::new(),
                shares: CheckpointLedger::new(),
                community: CheckpointLedger::new(),
                last_claimed: BTreeMap::new(),
                community_claimed: BTreeMap::new(),
                darknode_pool: BTreeMap::new(),
                community_pool: BTreeMap::new(),
                stray: BTreeMap::new(),
            },
            registry,
            store,
            events: Vec::new(),
        })
    }

    /// Rebuild a ledger from a `snapshot_json` dump.
    pub fn restore_json(
        json: &str,
        oracle: Arc<dyn RegistrationOracle>,
        store: S,
    ) -> std::result::Result<Self, serde_json::Error> {
        let mut state: RewardsState = serde_json::from_str(json)?;
        let registry = RegistryAdapter::new(oracle);
        state.registry = registry.address();
        Ok(Self {
            state,
            registry,
            store,
            events: Vec::new(),
        })
    }

    pub fn snapshot_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.state)
    }

    fn ensure_owner(&self, caller: &str) -> Result<()> {
        if caller != self.state.config.owner {
            return Err(RewardsError::NotOwner);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────

    pub fn register_token(&mut self, caller: &str, token: &str) -> Result<()> {
        self.ensure_owner(caller)?;
        if self.is_registered(token) {
            return Err(RewardsError::TokenAlreadyRegistered(token.to_string()));
        }
        self.state.tokens.push(token.to_string());
        self.events.push(RewardsEvent::TokenRegistered {
            token: token.to_string(),
        });
        info!("Token registered: {}", token);
        Ok(())
    }

    /// Stops new checkpoints for `token`. Recorded checkpoints stay, so
    /// everything accrued so far remains withdrawable.
    pub fn deregister_token(&mut self, caller: &str, token: &str) -> Result<()> {
        self.ensure_owner(caller)?;
        let idx = self
            .state
            .tokens
            .iter()
            .position(|t| t == token)
            .ok_or_else(|| RewardsError::TokenNotRegistered(token.to_string()))?;
        self.state.tokens.remove(idx);
        self.events.push(RewardsEvent::TokenDeregistered {
            token: token.to_string(),
        });
        info!("Token deregistered: {}", token);
        Ok(())
    }

    pub fn update_hourly_withheld(&mut self, caller: &str, numerator: u64) -> Result<()> {
        self.ensure_owner(caller)?;
        check_numerator(numerator)?;
        self.state.config.hourly_withheld_numerator = numerator;
        self.config_updated("hourly_withheld_numerator", numerator.to_string());
        Ok(())
    }

    pub fn update_community_fund_numerator(&mut self, caller: &str, numerator: u64) -> Result<()> {
        self.ensure_owner(caller)?;
        check_numerator(numerator)?;
        self.state.config.community_fund_numerator = numerator;
        self.config_updated("community_fund_numerator", numerator.to_string());
        Ok(())
    }

    /// Point the community fund at a new address. Unclaimed community
    /// rewards follow the role, not the old address.
    pub fn update_community_fund(&mut self, caller: &str, address: &str) -> Result<()> {
        self.ensure_owner(caller)?;
        if is_null_address(address) {
            return Err(RewardsError::InvalidCommunityFundAddress);
        }
        if self.registry.is_known_darknode(address) {
            return Err(RewardsError::CommunityFundIsDarknode);
        }
        self.state.config.community_fund = address.to_string();
        self.config_updated("community_fund", address.to_string());
        Ok(())
    }

    pub fn update_registration_oracle(
        &mut self,
        caller: &str,
        oracle: Arc<dyn RegistrationOracle>,
    ) -> Result<()> {
        self.ensure_owner(caller)?;
        let adapter = RegistryAdapter::new(oracle);
        if is_null_address(&adapter.address()) {
            return Err(RewardsError::InvalidRegistryAddress);
        }
        if adapter.is_known_darknode(&self.state.config.community_fund) {
            return Err(RewardsError::CommunityFundIsDarknode);
        }
        self.state.registry = adapter.address();
        self.registry = adapter;
        self.config_updated("registry", self.state.registry.clone());
        Ok(())
    }

    fn config_updated(&mut self, field: &str, value: String) {
        info!("Config updated: {} = {}", field, value);
        self.events.push(RewardsEvent::ConfigUpdated {
            field: field.to_string(),
            value,
        });
    }

    // ─────────────────────────────────────────────────────────────────
    // Funds
    // ─────────────────────────────────────────────────────────────────

    /// Fees paid into the store.
    pub fn deposit(&mut self, token: &str, amount: Amount) -> Result<()> {
        self.store.deposit(token, amount)
    }

    /// Funds sent to the ledger itself instead of the store.
    pub fn receive_direct(&mut self, token: &str, amount: Amount) -> Result<()> {
        let slot = self.state.stray.entry(token.to_string()).or_insert(0);
        *slot = slot
            .checked_add(amount)
            .ok_or(RewardsError::ArithmeticOverflow("stray balance"))?;
        Ok(())
    }

    /// Sweep stray funds into the store as available rewards.
    pub fn forward(&mut self, token: &str) -> Result<Amount> {
        let amount = self.stray_balance(token);
        if amount == 0 {
            return Ok(0);
        }
        self.store.deposit(token, amount)?;
        self.state.stray.remove(token);
        self.events.push(RewardsEvent::Forwarded {
            token: token.to_string(),
            amount,
        });
        info!("Forwarded {} {} to the store", amount, token);
        Ok(amount)
    }

    // ─────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &RewardsConfig {
        &self.state.config
    }

    pub fn state(&self) -> &RewardsState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &RegistryAdapter {
        &self.registry
    }

    pub fn is_registered(&self, token: &str) -> bool {
        self.state.tokens.iter().any(|t| t == token)
    }

    pub fn registered_tokens(&self) -> &[TokenId] {
        &self.state.tokens
    }

    pub fn latest_cycle(&self) -> Timestamp {
        self.state.latest_cycle
    }

    pub fn epoch_timestamps(&self) -> &[Timestamp] {
        &self.state.epoch_timestamps
    }

    /// Earliest epoch at or after `timestamp`, `None` if it has not happened yet.
    pub fn next_epoch_from(&self, timestamp: Timestamp) -> Option<Timestamp> {
        let epochs = &self.state.epoch_timestamps;
        let idx = epochs.partition_point(|e| *e < timestamp);
        epochs.get(idx).copied()
    }

    pub fn cumulative_share(&self, token: &str, timestamp: Timestamp) -> Amount {
        self.state.shares.cumulative_at(token, timestamp)
    }

    pub fn community_cumulative(&self, token: &str, timestamp: Timestamp) -> Amount {
        self.state.community.cumulative_at(token, timestamp)
    }

    pub fn last_claimed(&self, node: &str, token: &str) -> Timestamp {
        self.state
            .last_claimed
            .get(node)
            .and_then(|m| m.get(token))
            .copied()
            .unwrap_or(0)
    }

    pub fn darknode_pool(&self, token: &str) -> Amount {
        self.state.darknode_pool.get(token).copied().unwrap_or(0)
    }

    pub fn community_pool(&self, token: &str) -> Amount {
        self.state.community_pool.get(token).copied().unwrap_or(0)
    }

    pub fn stray_balance(&self, token: &str) -> Amount {
        self.state.stray.get(token).copied().unwrap_or(0)
    }

    pub fn drain_events(&mut self) -> Vec<RewardsEvent> {
        std::mem::take(&mut self.events)
    }

    /// Check that every unit the store holds for `token` is accounted for.
    pub fn audit(&self, token: &str) -> Result<TokenAudit> {
        let audit = TokenAudit {
            token: token.to_string(),
            available: self.store.available_balance(token),
            darknode_pool: self.darknode_pool(token),
            community_pool: self.community_pool(token),
            legacy: self.store.total_legacy(token),
            total: self.store.total_balance(token),
        };
        let accounted = audit
            .accounted()
            .ok_or(RewardsError::ArithmeticOverflow("audit"))?;
        if accounted != audit.total {
            return Err(RewardsError::SupplyMismatch {
                token: token.to_string(),
                accounted,
                total: audit.total,
            });
        }
        Ok(audit)
    }

    /// SHA3-256 over the accounting state in BTreeMap order.
    /// Two ledgers that processed the same operations agree on this root.
    pub fn state_root(&self) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(self.state.latest_cycle.to_le_bytes());
        for epoch in &self.state.epoch_timestamps {
            hasher.update(epoch.to_le_bytes());
        }
        for token in &self.state.tokens {
            hasher.update(token.as_bytes());
        }
        for ledger in [&self.state.shares, &self.state.community] {
            for token in ledger.tokens() {
                hasher.update(token.as_bytes());
                if let Some(series) = ledger.series(token) {
                    for c in series.iter() {
                        hasher.update(c.timestamp.to_le_bytes());
                        hasher.update(c.cumulative.to_le_bytes());
                    }
                }
            }
        }
        for (node, claims) in &self.state.last_claimed {
            hasher.update(node.as_bytes());
            for (token, ts) in claims {
                hasher.update(token.as_bytes());
                hasher.update(ts.to_le_bytes());
            }
        }
        for (token, ts) in &self.state.community_claimed {
            hasher.update(token.as_bytes());
            hasher.update(ts.to_le_bytes());
        }
        for pool in [&self.state.darknode_pool, &self.state.community_pool] {
            for (token, amount) in pool {
                hasher.update(token.as_bytes());
                hasher.update(amount.to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}
