//! Domain types for the commission engine.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper (minor-unit persistence)
//! - Domain primitives: ids, TimeMs, Address, Tier, LegSide
//! - Members, orders, commissions, tier configs, milestones, audit entries
//! - Settlement batch grouping and deterministic batch ids

pub mod audit;
pub mod batch;
pub mod commission;
pub mod decimal;
pub mod member;
pub mod milestone;
pub mod order;
pub mod primitives;
pub mod tier_config;

pub use audit::{AuditAction, AuditEntry, AuditFilter};
pub use batch::{compute_batch_id, transfers_for, BatchRecipients, SettlementTransfer, WalletGroup};
pub use commission::{
    Commission, CommissionKind, CommissionStatus, NewCommission, RECONSUMPTION_REQUIRED_NOTE,
};
pub use decimal::{Decimal, MONEY_SCALE};
pub use member::{Member, NewMember};
pub use milestone::{MilestoneBucket, MilestoneRewards, MilestoneStatus, UserMilestone};
pub use order::{Order, OrderStatus};
pub use primitives::{
    Address, CommissionId, LegSide, MemberId, OrderId, ParseEnumError, Tier, TimeMs,
};
pub use tier_config::{
    management_generations, qualifying_tier, TierConfig, MAX_MANAGEMENT_LEVEL,
};
