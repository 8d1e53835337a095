//! Referral-count milestones.

use super::{CommissionId, Decimal, MemberId, ParseEnumError, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reward bucket selected by `count % 6` for a positive even referral count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneBucket {
    /// count % 6 == 2
    X,
    /// count % 6 == 4
    Y,
    /// count % 6 == 0
    Z,
}

impl MilestoneBucket {
    /// Bucket for an active-referral count, or None when the count is not a
    /// positive even number.
    pub fn for_count(count: i64) -> Option<Self> {
        if count <= 0 || count % 2 != 0 {
            return None;
        }
        match count % 6 {
            2 => Some(MilestoneBucket::X),
            4 => Some(MilestoneBucket::Y),
            _ => Some(MilestoneBucket::Z),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneBucket::X => "x",
            MilestoneBucket::Y => "y",
            MilestoneBucket::Z => "z",
        }
    }
}

impl fmt::Display for MilestoneBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MilestoneBucket {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" => Ok(MilestoneBucket::X),
            "y" => Ok(MilestoneBucket::Y),
            "z" => Ok(MilestoneBucket::Z),
            other => Err(ParseEnumError::new("milestone bucket", other)),
        }
    }
}

/// Flat reward per bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneRewards {
    pub x: Decimal,
    pub y: Decimal,
    pub z: Decimal,
}

impl MilestoneRewards {
    pub fn amount_for(&self, bucket: MilestoneBucket) -> Decimal {
        match bucket {
            MilestoneBucket::X => self.x,
            MilestoneBucket::Y => self.y,
            MilestoneBucket::Z => self.z,
        }
    }
}

impl Default for MilestoneRewards {
    fn default() -> Self {
        Self {
            x: Decimal::from(50),
            y: Decimal::from(100),
            z: Decimal::from(200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneStatus {
    Pending,
    Paid,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::Paid => "paid",
        }
    }
}

impl FromStr for MilestoneStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MilestoneStatus::Pending),
            "paid" => Ok(MilestoneStatus::Paid),
            other => Err(ParseEnumError::new("milestone status", other)),
        }
    }
}

/// A milestone award, unique per `(member_id, milestone_count)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMilestone {
    pub member_id: MemberId,
    pub milestone_count: i64,
    pub reward_amount: Decimal,
    pub reward_kind: MilestoneBucket,
    pub status: MilestoneStatus,
    pub commission_id: Option<CommissionId>,
    pub created_at: TimeMs,
}
