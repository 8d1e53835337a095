//! Commission computation engine.
//!
//! This module provides:
//! - Per-order commission calculation (direct, group, management)
//! - Reconsumption gating and threshold suspension
//! - Referral milestone rewards
//! - Binary tree navigation over the member table
//! - A TTL cache over per-tier config

use crate::domain::MemberId;
use thiserror::Error;

pub mod calculator;
pub mod clock;
pub mod config_store;
pub mod milestone;
pub mod reconsumption;
pub mod tree;

pub use calculator::{
    AwardedCommission, CommissionCalculator, OrderSummary, ProcessOutcome, SkipReason,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config_store::{ConfigStore, TierConfigs};
pub use milestone::{MilestoneEngine, MilestoneOutcome};
pub use reconsumption::ReconsumptionGate;
pub use tree::{Lineage, MemberSource, TreeNavigator};

#[derive(Debug, Error)]
pub enum CommissionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("member not found: {0}")]
    MemberNotFound(MemberId),
}
