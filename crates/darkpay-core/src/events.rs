use serde::{Deserialize, Serialize};

use crate::{Address, Amount, Timestamp, TokenId};

/// State transitions recorded by `ClaimlessRewards`, drained by the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RewardsEvent {
    TokenRegistered {
        token: TokenId,
    },
    TokenDeregistered {
        token: TokenId,
    },
    CycleChanged {
        timestamp: Timestamp,
        previous: Timestamp,
        forced: bool,
        units: u64,
        live_darknodes: u64,
    },
    /// Epoch landing on the instant of the latest manual cycle.
    EpochRecorded {
        timestamp: Timestamp,
    },
    TokenCycle {
        token: TokenId,
        timestamp: Timestamp,
        share: Amount,
        community_cut: Amount,
        committed: Amount,
    },
    DarknodeWithdrew {
        node: Address,
        token: TokenId,
        amount: Amount,
        recipient: Address,
    },
    CommunityFundWithdrew {
        token: TokenId,
        amount: Amount,
        recipient: Address,
    },
    ConfigUpdated {
        field: String,
        value: String,
    },
    Forwarded {
        token: TokenId,
        amount: Amount,
    },
}
