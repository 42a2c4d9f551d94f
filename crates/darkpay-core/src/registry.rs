// ─────────────────────────────────────────────────────────────────
// Registration Oracle: darknode registry seen by the reward ledger
// ─────────────────────────────────────────────────────────────────
// The ledger only reads from the registry: registration and deregistration
// timestamps, the current operator, and the live darknode count. All values
// are wall-clock timestamps, so swapping one oracle for another never
// invalidates recorded checkpoints or claim pointers.
//
// Registration changes become reward-effective at the next epoch. The live
// count therefore only moves when the registry processes an epoch.
// ─────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use crate::{Address, Timestamp};

pub trait RegistrationOracle: Send + Sync {
    /// Address the registry calls the ledger from when forcing a rollover.
    fn address(&self) -> Address;

    /// Registration timestamp, 0 if the node is unknown.
    fn registered_at(&self, node: &str) -> Timestamp;

    /// Deregistration timestamp, 0 if the node has not deregistered.
    fn deregistered_at(&self, node: &str) -> Timestamp;

    fn operator_of(&self, node: &str) -> Option<Address>;

    fn live_darknode_count(&self) -> u64;
}

/// Read-only, swappable handle to the current registration oracle.
#[derive(Clone)]
pub struct RegistryAdapter {
    oracle: Arc<dyn RegistrationOracle>,
}

impl fmt::Debug for RegistryAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAdapter")
            .field("address", &self.oracle.address())
            .finish()
    }
}

impl RegistryAdapter {
    pub fn new(oracle: Arc<dyn RegistrationOracle>) -> Self {
        Self { oracle }
    }

    pub fn address(&self) -> Address {
        self.oracle.address()
    }

    pub fn registered_at(&self, node: &str) -> Timestamp {
        self.oracle.registered_at(node)
    }

    pub fn deregistered_at(&self, node: &str) -> Timestamp {
        self.oracle.deregistered_at(node)
    }

    pub fn operator_of(&self, node: &str) -> Option<Address> {
        self.oracle.operator_of(node)
    }

    pub fn live_count(&self) -> u64 {
        self.oracle.live_darknode_count()
    }

    /// True while the registry holds any registration record for `address`,
    /// including pending registrations and deregistrations awaiting refund.
    pub fn is_known_darknode(&self, address: &str) -> bool {
        self.oracle.registered_at(address) != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("darknode already registered: {0}")]
    AlreadyRegistered(Address),
    #[error("darknode not registered: {0}")]
    NotRegistered(Address),
    #[error("darknode already deregistered: {0}")]
    AlreadyDeregistered(Address),
    #[error("darknode not refundable yet: {0}")]
    NotRefundable(Address),
    #[error("epoch {requested} is not after previous epoch {previous}")]
    EpochOutOfOrder {
        previous: Timestamp,
        requested: Timestamp,
    },
}

#[derive(Debug, Clone)]
struct NodeRecord {
    operator: Address,
    registered_at: Timestamp,
    deregistered_at: Timestamp,
}

#[derive(Debug, Default)]
struct RegistryState {
    nodes: BTreeMap<Address, NodeRecord>,
    last_epoch: Timestamp,
}

/// Registry used by the simulation harness, the CLI and the tests.
/// Interior locking lets it be shared with the ledger behind an `Arc`.
#[derive(Debug)]
pub struct InMemoryRegistry {
    address: Address,
    state: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    pub fn new(address: &str, genesis: Timestamp) -> Self {
        Self {
            address: address.to_string(),
            state: RwLock::new(RegistryState {
                nodes: BTreeMap::new(),
                last_epoch: genesis,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, node: &str, operator: &str, now: Timestamp) -> Result<(), RegistryError> {
        let mut state = self.write();
        if state.nodes.contains_key(node) {
            return Err(RegistryError::AlreadyRegistered(node.to_string()));
        }
        state.nodes.insert(
            node.to_string(),
            NodeRecord {
                operator: operator.to_string(),
                registered_at: now,
                deregistered_at: 0,
            },
        );
        Ok(())
    }

    pub fn deregister(&self, node: &str, now: Timestamp) -> Result<(), RegistryError> {
        let mut state = self.write();
        let record = state
            .nodes
            .get_mut(node)
            .ok_or_else(|| RegistryError::NotRegistered(node.to_string()))?;
        if record.deregistered_at != 0 {
            return Err(RegistryError::AlreadyDeregistered(node.to_string()));
        }
        record.deregistered_at = now;
        Ok(())
    }

    /// Drop the node's record once its deregistration has taken effect.
    /// The node can then register again under a fresh timestamp.
    pub fn refund(&self, node: &str) -> Result<(), RegistryError> {
        let mut state = self.write();
        let last_epoch = state.last_epoch;
        let record = state
            .nodes
            .get(node)
            .ok_or_else(|| RegistryError::NotRegistered(node.to_string()))?;
        if record.deregistered_at == 0 || record.deregistered_at > last_epoch {
            return Err(RegistryError::NotRefundable(node.to_string()));
        }
        state.nodes.remove(node);
        Ok(())
    }

    /// Process an epoch boundary. Pending registrations and deregistrations
    /// at or before `now` take effect.
    pub fn epoch(&self, now: Timestamp) -> Result<(), RegistryError> {
        let mut state = self.write();
        if now <= state.last_epoch {
            return Err(RegistryError::EpochOutOfOrder {
                previous: state.last_epoch,
                requested: now,
            });
        }
        state.last_epoch = now;
        Ok(())
    }

    pub fn last_epoch(&self) -> Timestamp {
        self.read().last_epoch
    }

    pub fn darknodes(&self) -> Vec<Address> {
        self.read().nodes.keys().cloned().collect()
    }
}

impl RegistrationOracle for InMemoryRegistry {
    fn address(&self) -> Address {
        self.address.clone()
    }

    fn registered_at(&self, node: &str) -> Timestamp {
        self.read()
            .nodes
            .get(node)
            .map(|r| r.registered_at)
            .unwrap_or(0)
    }

    fn deregistered_at(&self, node: &str) -> Timestamp {
        self.read()
            .nodes
            .get(node)
            .map(|r| r.deregistered_at)
            .unwrap_or(0)
    }

    fn operator_of(&self, node: &str) -> Option<Address> {
        self.read().nodes.get(node).map(|r| r.operator.clone())
    }

    fn live_darknode_count(&self) -> u64 {
        let state = self.read();
        let epoch = state.last_epoch;
        state
            .nodes
            .values()
            .filter(|r| r.registered_at <= epoch)
            .filter(|r| r.deregistered_at == 0 || r.deregistered_at > epoch)
            .count() as u64
    }
}
