// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DARKPAY - CORE MODULE
//
// Claimless darknode reward ledger. Deposited fees are split once per cycle
// into a withheld part and a paid-out part; the paid-out part is recorded as
// a cumulative per-node share checkpoint. A darknode's balance is never
// written per cycle: it is derived at withdrawal time as the difference of two
// checkpoints bounded by the node's registration window.
// All financial arithmetic uses u128 base units (no floating-point).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod checkpoint;
pub mod config;
pub mod cycle;
pub mod error;
pub mod events;
pub mod registry;
pub mod rewards;
pub mod sim;
pub mod store;
pub mod withdraw;

pub use checkpoint::{Checkpoint, CheckpointLedger, CheckpointSeries};
pub use config::{ConfigError, RewardsConfig};
pub use cycle::{CycleOutcome, CyclePlan, CycleTrigger, TokenCycle};
pub use error::{ErrorKind, RewardsError};
pub use events::RewardsEvent;
pub use registry::{InMemoryRegistry, RegistrationOracle, RegistryAdapter};
pub use rewards::{ClaimlessRewards, RewardsState, TokenAudit};
pub use store::{BalanceStore, InMemoryStore};
pub use withdraw::{Claim, Withdrawal};

/// Account identifier (darknode ID, operator, community fund, oracle).
pub type Address = String;
/// Token identifier. `"ETH"` is used for the native asset by convention.
pub type TokenId = String;
/// Unix timestamp in seconds.
pub type Timestamp = u64;
/// Token amount in base units.
pub type Amount = u128;

/// Shared denominator for the withheld fraction and the community fund fraction.
/// 1_000_000 = 100%.
pub const NUMERATOR_DENOMINATOR: u64 = 1_000_000;

/// Compounding unit for the withheld fraction (one hour).
pub const CYCLE_UNIT_SECS: u64 = 60 * 60;

/// 99.9% of the free balance is retained per elapsed hour.
pub const DEFAULT_HOURLY_WITHHELD_NUMERATOR: u64 = 999_000;

/// 5% of every cycle's payout goes to the community fund.
pub const DEFAULT_COMMUNITY_FUND_NUMERATOR: u64 = 50_000;

/// Canonical null address.
pub const NULL_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Returns true for the empty string and any all-zero hex address
/// (`0x0`, `0x000…0`).
pub fn is_null_address(address: &str) -> bool {
    let body = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    body.chars().all(|c| c == '0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_address() {
        assert!(is_null_address(""));
        assert!(is_null_address("0x"));
        assert!(is_null_address("0x0"));
        assert!(is_null_address(NULL_ADDRESS));
        assert!(!is_null_address("0x01"));
        assert!(!is_null_address("community-fund"));
    }

    #[test]
    fn test_default_numerators_within_denominator() {
        assert!(DEFAULT_HOURLY_WITHHELD_NUMERATOR <= NUMERATOR_DENOMINATOR);
        assert!(DEFAULT_COMMUNITY_FUND_NUMERATOR <= NUMERATOR_DENOMINATOR);
    }
}
