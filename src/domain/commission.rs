//! Commission ledger rows.

use super::{CommissionId, Decimal, LegSide, MemberId, OrderId, ParseEnumError, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Note attached to commissions held back by the reconsumption gate.
pub const RECONSUMPTION_REQUIRED_NOTE: &str = "reconsumption required";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionKind {
    Direct,
    Group,
    Management,
    Milestone,
}

impl CommissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionKind::Direct => "direct",
            CommissionKind::Group => "group",
            CommissionKind::Management => "management",
            CommissionKind::Milestone => "milestone",
        }
    }
}

impl fmt::Display for CommissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommissionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(CommissionKind::Direct),
            "group" => Ok(CommissionKind::Group),
            "management" => Ok(CommissionKind::Management),
            "milestone" => Ok(CommissionKind::Milestone),
            other => Err(ParseEnumError::new("commission kind", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Paid,
    Blocked,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Paid => "paid",
            CommissionStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommissionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommissionStatus::Pending),
            "paid" => Ok(CommissionStatus::Paid),
            "blocked" => Ok(CommissionStatus::Blocked),
            other => Err(ParseEnumError::new("commission status", other)),
        }
    }
}

/// A persisted commission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: CommissionId,
    pub beneficiary_id: MemberId,
    /// None for milestone rewards, which are not tied to an order.
    pub order_id: Option<OrderId>,
    /// Member whose purchase (or registration) generated the row.
    pub source_member_id: Option<MemberId>,
    pub kind: CommissionKind,
    pub status: CommissionStatus,
    pub amount: Decimal,
    pub order_amount: Decimal,
    /// Generation 1..=3, management only.
    pub level: Option<u8>,
    /// Group only.
    pub side: Option<LegSide>,
    pub notes: Option<String>,
    pub batch_id: Option<String>,
    pub tx_id: Option<String>,
    pub settled_at: Option<TimeMs>,
    pub created_at: TimeMs,
}

/// Insert payload for a commission row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommission {
    pub beneficiary_id: MemberId,
    pub order_id: Option<OrderId>,
    pub source_member_id: Option<MemberId>,
    pub kind: CommissionKind,
    pub status: CommissionStatus,
    pub amount: Decimal,
    pub order_amount: Decimal,
    pub level: Option<u8>,
    pub side: Option<LegSide>,
    pub notes: Option<String>,
}
