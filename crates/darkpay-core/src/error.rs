// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DARKPAY - ERRORS
//
// Every failed operation reverts with exactly one of these reasons. Callers
// branch on `code()` (stable strings) or `kind()` rather than on Display text.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::{Address, Amount, Timestamp, TokenId};
use thiserror::Error;

/// Broad failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller or argument rejected before any state was read for accounting.
    Precondition,
    /// Cycle rollover requested at the wrong time.
    Temporal,
    /// Balance would go negative or overflow. Unreachable unless the
    /// accounting itself is broken.
    AccountingInvariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewardsError {
    #[error("caller is not the owner")]
    NotOwner,
    #[error("not operator of darknode {node}")]
    NotOperator { node: Address },
    #[error("caller is not the darknode registry")]
    NotRegistry,
    #[error("invalid node ID")]
    InvalidNodeId,
    #[error("token already registered: {0}")]
    TokenAlreadyRegistered(TokenId),
    #[error("token not registered: {0}")]
    TokenNotRegistered(TokenId),
    #[error("registration pending for darknode {node}")]
    RegistrationPending { node: Address },
    #[error("invalid numerator {numerator} (denominator {denominator})")]
    InvalidNumerator { numerator: u64, denominator: u64 },
    #[error("invalid community fund address")]
    InvalidCommunityFundAddress,
    #[error("invalid darknode registry address")]
    InvalidRegistryAddress,
    #[error("community fund must not be a registered darknode")]
    CommunityFundIsDarknode,
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("previous cycle too recent: {elapsed}s elapsed, {required}s required")]
    CycleTooRecent { elapsed: u64, required: u64 },
    #[error("cycle timestamp {requested} is not after previous cycle {previous}")]
    CycleTimestampCollision {
        previous: Timestamp,
        requested: Timestamp,
    },
    #[error("checkpoint timestamp {requested} is not after latest {latest} for {token}")]
    CheckpointOutOfOrder {
        token: TokenId,
        latest: Timestamp,
        requested: Timestamp,
    },

    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),
    #[error("arithmetic underflow in {0}")]
    ArithmeticUnderflow(&'static str),
    #[error("insufficient available balance of {token}: have {available}, need {requested}")]
    InsufficientAvailable {
        token: TokenId,
        available: Amount,
        requested: Amount,
    },
    #[error("insufficient locked balance of {token}: have {locked}, need {requested}")]
    InsufficientLocked {
        token: TokenId,
        locked: Amount,
        requested: Amount,
    },
    #[error("supply mismatch for {token}: accounted {accounted}, held {total}")]
    SupplyMismatch {
        token: TokenId,
        accounted: Amount,
        total: Amount,
    },
}

impl RewardsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotOwner
            | Self::NotOperator { .. }
            | Self::NotRegistry
            | Self::InvalidNodeId
            | Self::TokenAlreadyRegistered(_)
            | Self::TokenNotRegistered(_)
            | Self::RegistrationPending { .. }
            | Self::InvalidNumerator { .. }
            | Self::InvalidCommunityFundAddress
            | Self::InvalidRegistryAddress
            | Self::CommunityFundIsDarknode
            | Self::InvalidConfig(_) => ErrorKind::Precondition,
            Self::CycleTooRecent { .. }
            | Self::CycleTimestampCollision { .. }
            | Self::CheckpointOutOfOrder { .. } => ErrorKind::Temporal,
            Self::ArithmeticOverflow(_)
            | Self::ArithmeticUnderflow(_)
            | Self::InsufficientAvailable { .. }
            | Self::InsufficientLocked { .. }
            | Self::SupplyMismatch { .. } => ErrorKind::AccountingInvariant,
        }
    }

    /// Stable reason code. Never changes between releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotOwner => "not_owner",
            Self::NotOperator { .. } => "not_operator",
            Self::NotRegistry => "not_registry",
            Self::InvalidNodeId => "invalid_node_id",
            Self::TokenAlreadyRegistered(_) => "token_already_registered",
            Self::TokenNotRegistered(_) => "token_not_registered",
            Self::RegistrationPending { .. } => "registration_pending",
            Self::InvalidNumerator { .. } => "invalid_numerator",
            Self::InvalidCommunityFundAddress => "invalid_community_fund_address",
            Self::InvalidRegistryAddress => "invalid_registry_address",
            Self::CommunityFundIsDarknode => "community_fund_is_darknode",
            Self::InvalidConfig(_) => "invalid_config",
            Self::CycleTooRecent { .. } => "cycle_too_recent",
            Self::CycleTimestampCollision { .. } => "cycle_timestamp_collision",
            Self::CheckpointOutOfOrder { .. } => "checkpoint_out_of_order",
            Self::ArithmeticOverflow(_) => "arithmetic_overflow",
            Self::ArithmeticUnderflow(_) => "arithmetic_underflow",
            Self::InsufficientAvailable { .. } => "insufficient_available",
            Self::InsufficientLocked { .. } => "insufficient_locked",
            Self::SupplyMismatch { .. } => "supply_mismatch",
        }
    }
}

pub type Result<T> = std::result::Result<T, RewardsError>;
