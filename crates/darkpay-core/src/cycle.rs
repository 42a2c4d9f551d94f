// ─────────────────────────────────────────────────────────────────
// Cycle Engine: per-token split of available funds at each rollover
// ─────────────────────────────────────────────────────────────────
// free            = available balance in the store
// withheld        = free × (num/den), applied once per elapsed cycle unit,
//                   rounding down each step
// payout          = free − withheld
// community cut   = floor(payout × community_num / den)
// per-node share  = floor((payout − community cut) / live darknodes)
// committed       = community cut + share × live darknodes
//
// Only `committed` leaves `available`. Rounding dust, and the whole darknode
// portion when no darknode is live, stays behind for the next cycle.
//
// Triggers:
//   manual: after the minimum interval, timestamp aligned to whole units
//   epoch:  forced by the registry, timestamp = now, recorded as an epoch.
//           If a manual cycle already landed on `now`, the epoch is only
//           recorded and no second rollover happens.
// ─────────────────────────────────────────────────────────────────

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RewardsError};
use crate::events::RewardsEvent;
use crate::rewards::ClaimlessRewards;
use crate::store::BalanceStore;
use crate::{Amount, Timestamp, TokenId, NUMERATOR_DENOMINATOR};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleTrigger {
    Manual,
    Epoch,
}

/// Where and how far a rollover moves the cycle clock.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePlan {
    pub timestamp: Timestamp,
    pub previous: Timestamp,
    /// Whole cycle units elapsed since `previous`.
    pub units: u64,
    pub trigger: CycleTrigger,
}

impl CyclePlan {
    pub fn forced(&self) -> bool {
        self.trigger == CycleTrigger::Epoch
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenCycle {
    pub token: TokenId,
    pub free: Amount,
    pub withheld: Amount,
    pub payout: Amount,
    pub community_cut: Amount,
    pub darknode_portion: Amount,
    pub share: Amount,
    pub committed: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub plan: CyclePlan,
    pub live_darknodes: u64,
    pub tokens: Vec<TokenCycle>,
}

/// floor(value × numerator / denominator) for `numerator <= denominator`,
/// without widening past u128.
pub fn mul_div_floor(value: Amount, numerator: u64, denominator: u64) -> Result<Amount> {
    if denominator == 0 {
        return Err(RewardsError::ArithmeticOverflow("division by zero denominator"));
    }
    let num = numerator as u128;
    let den = denominator as u128;
    let whole = (value / den)
        .checked_mul(num)
        .ok_or(RewardsError::ArithmeticOverflow("mul_div whole part"))?;
    let rest = (value % den)
        .checked_mul(num)
        .ok_or(RewardsError::ArithmeticOverflow("mul_div remainder"))?
        / den;
    whole
        .checked_add(rest)
        .ok_or(RewardsError::ArithmeticOverflow("mul_div"))
}

/// Retain `numerator/denominator` of `free` once per elapsed unit.
pub fn withheld_amount(free: Amount, numerator: u64, denominator: u64, units: u64) -> Result<Amount> {
    let mut withheld = free;
    for _ in 0..units {
        if withheld == 0 || numerator >= denominator {
            break;
        }
        withheld = mul_div_floor(withheld, numerator, denominator)?;
    }
    Ok(withheld)
}

/// Split one token's free balance for a cycle spanning `units` units.
pub fn split_payout(
    token: &str,
    free: Amount,
    units: u64,
    hourly_withheld_numerator: u64,
    community_fund_numerator: u64,
    live_darknodes: u64,
) -> Result<TokenCycle> {
    let withheld = withheld_amount(free, hourly_withheld_numerator, NUMERATOR_DENOMINATOR, units)?;
    let payout = free
        .checked_sub(withheld)
        .ok_or(RewardsError::ArithmeticUnderflow("cycle payout"))?;
    let community_cut = mul_div_floor(payout, community_fund_numerator, NUMERATOR_DENOMINATOR)?;
    let darknode_portion = payout
        .checked_sub(community_cut)
        .ok_or(RewardsError::ArithmeticUnderflow("darknode portion"))?;

    let (share, darknode_committed) = if live_darknodes == 0 {
        (0, 0)
    } else {
        let live = live_darknodes as u128;
        let share = darknode_portion / live;
        let committed = share
            .checked_mul(live)
            .ok_or(RewardsError::ArithmeticOverflow("darknode committed"))?;
        (share, committed)
    };
    let committed = community_cut
        .checked_add(darknode_committed)
        .ok_or(RewardsError::ArithmeticOverflow("cycle committed"))?;

    Ok(TokenCycle {
        token: token.to_string(),
        free,
        withheld,
        payout,
        community_cut,
        darknode_portion,
        share,
        committed,
    })
}

pub fn plan_manual(
    latest: Timestamp,
    now: Timestamp,
    unit_secs: u64,
    minimum_interval_secs: u64,
) -> Result<CyclePlan> {
    let elapsed = now.saturating_sub(latest);
    if elapsed < minimum_interval_secs || elapsed == 0 {
        return Err(RewardsError::CycleTooRecent {
            elapsed,
            required: minimum_interval_secs,
        });
    }
    let unit = unit_secs.max(1);
    let units = elapsed / unit;
    if units == 0 {
        return Err(RewardsError::CycleTooRecent {
            elapsed,
            required: unit,
        });
    }
    Ok(CyclePlan {
        // units * unit <= elapsed, never past `now`
        timestamp: latest + units * unit,
        previous: latest,
        units,
        trigger: CycleTrigger::Manual,
    })
}

pub fn plan_forced(latest: Timestamp, now: Timestamp, unit_secs: u64) -> Result<CyclePlan> {
    if now <= latest {
        return Err(RewardsError::CycleTimestampCollision {
            previous: latest,
            requested: now,
        });
    }
    Ok(CyclePlan {
        timestamp: now,
        previous: latest,
        units: (now - latest) / unit_secs.max(1),
        trigger: CycleTrigger::Epoch,
    })
}

impl<S: BalanceStore> ClaimlessRewards<S> {
    /// Manual rollover. Anyone may call it once the minimum interval has
    /// passed since the latest cycle.
    pub fn change_cycle(&mut self, now: Timestamp) -> Result<CycleOutcome> {
        let config = &self.state.config;
        let plan = plan_manual(
            self.state.latest_cycle,
            now,
            config.cycle_unit_secs,
            config.minimum_cycle_interval_secs,
        )?;
        self.apply_cycle(plan)
    }

    /// Forced rollover at an epoch boundary. Must be called by the registry
    /// before it applies the epoch, so the live count still describes the
    /// period that is ending.
    pub fn on_epoch(&mut self, caller: &str, now: Timestamp) -> Result<CycleOutcome> {
        if caller != self.registry.address() {
            return Err(RewardsError::NotRegistry);
        }
        let latest = self.state.latest_cycle;
        let last_epoch = self.state.epoch_timestamps.last().copied().unwrap_or(0);
        if now == latest && last_epoch < now {
            return Ok(self.record_epoch(now));
        }
        let plan = plan_forced(latest, now, self.state.config.cycle_unit_secs)?;
        self.apply_cycle(plan)
    }

    /// Epoch on the instant of an existing manual cycle. The checkpoint at
    /// `now` already closes the period, so only the epoch is recorded.
    fn record_epoch(&mut self, now: Timestamp) -> CycleOutcome {
        let live = self.registry.live_count();
        self.state.epoch_timestamps.push(now);
        self.events.push(RewardsEvent::EpochRecorded { timestamp: now });
        info!(
            "Epoch {} recorded on the latest cycle ({} live darknodes)",
            now, live
        );
        CycleOutcome {
            plan: CyclePlan {
                timestamp: now,
                previous: now,
                units: 0,
                trigger: CycleTrigger::Epoch,
            },
            live_darknodes: live,
            tokens: Vec::new(),
        }
    }

    fn apply_cycle(&mut self, plan: CyclePlan) -> Result<CycleOutcome> {
        let live = self.registry.live_count();
        let withheld_num = self.state.config.hourly_withheld_numerator;
        let community_num = self.state.config.community_fund_numerator;

        if live == 0 {
            warn!(
                "Cycle {} runs with no live darknodes: darknode portions stay available",
                plan.timestamp
            );
        }

        // Every token is split and checked before any of them is written.
        let mut staged = Vec::with_capacity(self.state.tokens.len());
        for token in &self.state.tokens {
            let free = self.store.available_balance(token);
            let split = split_payout(token, free, plan.units, withheld_num, community_num, live)?;
            self.state
                .shares
                .check_record(token, plan.timestamp, split.share)?;
            self.state
                .community
                .check_record(token, plan.timestamp, split.community_cut)?;
            let darknode_pool = self
                .darknode_pool(token)
                .checked_add(split.committed - split.community_cut)
                .ok_or(RewardsError::ArithmeticOverflow("darknode pool"))?;
            let community_pool = self
                .community_pool(token)
                .checked_add(split.community_cut)
                .ok_or(RewardsError::ArithmeticOverflow("community pool"))?;
            staged.push((split, darknode_pool, community_pool));
        }

        let mut tokens = Vec::with_capacity(staged.len());
        for (split, darknode_pool, community_pool) in staged {
            let token = &split.token;
            self.store.commit(token, split.committed)?;
            self.state.shares.record(token, plan.timestamp, split.share)?;
            self.state
                .community
                .record(token, plan.timestamp, split.community_cut)?;
            self.state.darknode_pool.insert(token.clone(), darknode_pool);
            self.state.community_pool.insert(token.clone(), community_pool);

            debug!(
                "Cycle {} {}: free={} withheld={} payout={} community={} share={} committed={}",
                plan.timestamp,
                token,
                split.free,
                split.withheld,
                split.payout,
                split.community_cut,
                split.share,
                split.committed
            );
            self.events.push(RewardsEvent::TokenCycle {
                token: token.clone(),
                timestamp: plan.timestamp,
                share: split.share,
                community_cut: split.community_cut,
                committed: split.committed,
            });
            tokens.push(split);
        }

        self.state.latest_cycle = plan.timestamp;
        if plan.forced() {
            self.state.epoch_timestamps.push(plan.timestamp);
        }
        self.events.push(RewardsEvent::CycleChanged {
            timestamp: plan.timestamp,
            previous: plan.previous,
            forced: plan.forced(),
            units: plan.units,
            live_darknodes: live,
        });
        info!(
            "Cycle changed {} -> {} ({} units, {}, {} live darknodes)",
            plan.previous,
            plan.timestamp,
            plan.units,
            if plan.forced() { "epoch" } else { "manual" },
            live
        );

        Ok(CycleOutcome {
            plan,
            live_darknodes: live,
            tokens,
        })
    }
}
