// ─────────────────────────────────────────────────────────────────
// Checkpoint Ledger: per-token cumulative share series
// ─────────────────────────────────────────────────────────────────
// Each token owns an append-only series of (timestamp, cumulative) pairs.
// Timestamps strictly increase; cumulative values never decrease.
//
// Reads:
//   cumulative_at(t): latest checkpoint at or before t, else 0
//   ceiling_at(t):    earliest checkpoint timestamp at or after t
// Anything past the latest checkpoint has "not happened yet" and is never
// extrapolated.
// ─────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, RewardsError};
use crate::{Amount, Timestamp, TokenId};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub timestamp: Timestamp,
    pub cumulative: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointSeries {
    points: Vec<Checkpoint>,
}

impl CheckpointSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&Checkpoint> {
        self.points.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.points.iter()
    }

    /// Validate that `delta` can be appended at `timestamp` and return the
    /// resulting cumulative value. Does not mutate.
    pub fn next_cumulative(&self, timestamp: Timestamp, delta: Amount) -> Option<Amount> {
        match self.points.last() {
            Some(last) if timestamp <= last.timestamp => None,
            Some(last) => last.cumulative.checked_add(delta),
            None => Some(delta),
        }
    }

    /// Floor lookup. Zero before the first checkpoint.
    pub fn cumulative_at(&self, timestamp: Timestamp) -> Amount {
        let idx = self.points.partition_point(|c| c.timestamp <= timestamp);
        if idx == 0 {
            0
        } else {
            self.points[idx - 1].cumulative
        }
    }

    /// Ceiling lookup. `None` if nothing has been recorded at or after `timestamp`.
    pub fn ceiling_at(&self, timestamp: Timestamp) -> Option<Timestamp> {
        let idx = self.points.partition_point(|c| c.timestamp < timestamp);
        self.points.get(idx).map(|c| c.timestamp)
    }
}

/// Checkpoint series for every token that has ever been registered.
/// Series are never removed: token deregistration only stops new writes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointLedger {
    series: BTreeMap<TokenId, CheckpointSeries>,
}

impl CheckpointLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cumulative value `record` would append, without appending it.
    pub fn check_record(&self, token: &str, timestamp: Timestamp, delta: Amount) -> Result<Amount> {
        let Some(series) = self.series.get(token) else {
            return Ok(delta);
        };
        if let Some(last) = series.latest() {
            if timestamp <= last.timestamp {
                return Err(RewardsError::CheckpointOutOfOrder {
                    token: token.to_string(),
                    latest: last.timestamp,
                    requested: timestamp,
                });
            }
        }
        series
            .next_cumulative(timestamp, delta)
            .ok_or(RewardsError::ArithmeticOverflow("checkpoint cumulative"))
    }

    /// Append `previous + delta` at `timestamp`. Returns the new cumulative value.
    pub fn record(&mut self, token: &str, timestamp: Timestamp, delta: Amount) -> Result<Amount> {
        let cumulative = self.check_record(token, timestamp, delta)?;
        self.series
            .entry(token.to_string())
            .or_default()
            .points
            .push(Checkpoint {
                timestamp,
                cumulative,
            });
        Ok(cumulative)
    }

    pub fn cumulative_at(&self, token: &str, timestamp: Timestamp) -> Amount {
        self.series
            .get(token)
            .map(|s| s.cumulative_at(timestamp))
            .unwrap_or(0)
    }

    pub fn ceiling_at(&self, token: &str, timestamp: Timestamp) -> Option<Timestamp> {
        self.series.get(token).and_then(|s| s.ceiling_at(timestamp))
    }

    /// `cumulative_at(upper) - cumulative_at(lower)`. Zero when `upper <= lower`.
    pub fn difference(&self, token: &str, lower: Timestamp, upper: Timestamp) -> Result<Amount> {
        if upper <= lower {
            return Ok(0);
        }
        self.cumulative_at(token, upper)
            .checked_sub(self.cumulative_at(token, lower))
            .ok_or(RewardsError::ArithmeticUnderflow("checkpoint difference"))
    }

    pub fn series(&self, token: &str) -> Option<&CheckpointSeries> {
        self.series.get(token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenId> {
        self.series.keys()
    }
}
