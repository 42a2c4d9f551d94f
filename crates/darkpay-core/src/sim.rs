// ─────────────────────────────────────────────────────────────────
// Simulation harness: in-memory registry, store and ledger on one clock
// ─────────────────────────────────────────────────────────────────
// Drives the ledger the way the on-chain collaborators would: the registry
// forces a rollover before it applies each epoch, fees land in the store,
// operators withdraw. Used by the CLI `simulate` command and the tests.
// ─────────────────────────────────────────────────────────────────

use std::sync::Arc;
use thiserror::Error;

use crate::cycle::CycleOutcome;
use crate::error::RewardsError;
use crate::registry::{InMemoryRegistry, RegistrationOracle, RegistryError};
use crate::rewards::{ClaimlessRewards, TokenAudit};
use crate::store::InMemoryStore;
use crate::withdraw::Withdrawal;
use crate::{Address, Amount, RewardsConfig, Timestamp, TokenId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error(transparent)]
    Rewards(#[from] RewardsError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type SimResult<T> = std::result::Result<T, SimError>;

#[derive(Debug)]
pub struct Network {
    pub registry: Arc<InMemoryRegistry>,
    pub rewards: ClaimlessRewards<InMemoryStore>,
    now: Timestamp,
}

impl Network {
    pub const REGISTRY_ADDRESS: &'static str = "darknode-registry";

    pub fn new(config: RewardsConfig, genesis: Timestamp) -> SimResult<Self> {
        Self::with_store(config, InMemoryStore::new(), genesis)
    }

    /// Start from a pre-seeded store, e.g. one carrying legacy balances.
    pub fn with_store(
        config: RewardsConfig,
        store: InMemoryStore,
        genesis: Timestamp,
    ) -> SimResult<Self> {
        let registry = Arc::new(InMemoryRegistry::new(Self::REGISTRY_ADDRESS, genesis));
        let rewards = ClaimlessRewards::new(config, registry.clone(), store, genesis)?;
        Ok(Self {
            registry,
            rewards,
            now: genesis,
        })
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn advance(&mut self, secs: u64) -> Timestamp {
        self.now = self.now.saturating_add(secs);
        self.now
    }

    pub fn owner(&self) -> Address {
        self.rewards.config().owner.clone()
    }

    pub fn register_token(&mut self, token: &str) -> SimResult<()> {
        let owner = self.owner();
        Ok(self.rewards.register_token(&owner, token)?)
    }

    pub fn deregister_token(&mut self, token: &str) -> SimResult<()> {
        let owner = self.owner();
        Ok(self.rewards.deregister_token(&owner, token)?)
    }

    pub fn register_node(&mut self, node: &str, operator: &str) -> SimResult<()> {
        Ok(self.registry.register(node, operator, self.now)?)
    }

    pub fn deregister_node(&mut self, node: &str) -> SimResult<()> {
        Ok(self.registry.deregister(node, self.now)?)
    }

    pub fn refund_node(&mut self, node: &str) -> SimResult<()> {
        Ok(self.registry.refund(node)?)
    }

    /// Epoch boundary at the current time: forced rollover, then the
    /// registry applies pending registrations and deregistrations.
    pub fn epoch(&mut self) -> SimResult<CycleOutcome> {
        let last = self.registry.last_epoch();
        if self.now <= last {
            return Err(RegistryError::EpochOutOfOrder {
                previous: last,
                requested: self.now,
            }
            .into());
        }
        let outcome = self.rewards.on_epoch(&self.registry.address(), self.now)?;
        self.registry.epoch(self.now)?;
        Ok(outcome)
    }

    pub fn change_cycle(&mut self) -> SimResult<CycleOutcome> {
        Ok(self.rewards.change_cycle(self.now)?)
    }

    pub fn deposit(&mut self, token: &str, amount: Amount) -> SimResult<()> {
        Ok(self.rewards.deposit(token, amount)?)
    }

    /// Withdraw as the node's current operator.
    pub fn withdraw(&mut self, node: &str, token: &str) -> SimResult<Amount> {
        let operator = self.registry.operator_of(node).unwrap_or_default();
        Ok(self.rewards.withdraw(&operator, node, token)?)
    }

    pub fn withdraw_to_community_fund(&mut self, tokens: &[TokenId]) -> SimResult<Vec<Withdrawal>> {
        Ok(self.rewards.withdraw_to_community_fund(tokens)?)
    }

    pub fn audit_all(&self) -> SimResult<Vec<TokenAudit>> {
        let mut tokens: Vec<TokenId> = self.rewards.registered_tokens().to_vec();
        for token in self.rewards.state().shares.tokens() {
            if !tokens.contains(token) {
                tokens.push(token.clone());
            }
        }
        tokens
            .iter()
            .map(|t| self.rewards.audit(t).map_err(SimError::from))
            .collect()
    }
}
