//! Reconsumption gate: earning past the tier threshold requires re-purchasing.

use super::ConfigStore;
use crate::db::LedgerTx;
use crate::domain::{Decimal, Member, Tier, TierConfig};
use std::sync::Arc;
use tracing::info;

pub struct ReconsumptionGate {
    configs: Arc<ConfigStore>,
}

impl ReconsumptionGate {
    pub fn new(configs: Arc<ConfigStore>) -> Self {
        Self { configs }
    }

    /// Whether `member` may currently earn commissions.
    pub async fn eligible(&self, member: &Member) -> Result<bool, sqlx::Error> {
        if !member.tier.is_active() {
            return Ok(false);
        }
        let config = self.configs.get(member.tier).await?;
        Ok(Self::check(member, &config))
    }

    /// Gate rule against an already loaded config of the member's tier.
    pub fn check(member: &Member, config: &TierConfig) -> bool {
        if !member.tier.is_active() {
            return false;
        }
        if member.total_commission_received < config.reconsumption_threshold {
            return true;
        }
        member.total_reconsumption_amount >= config.reconsumption_required
    }

    /// True when a credit moved the received total from below the threshold
    /// to at or above it.
    pub fn crosses_threshold(before: Decimal, after: Decimal, config: &TierConfig) -> bool {
        config.tier.is_active()
            && before < config.reconsumption_threshold
            && after >= config.reconsumption_threshold
    }
}

/// Add `amount` to `member`'s received total and suspend them if this credit
/// crosses their tier's threshold. Returns true on suspension.
pub async fn credit_commission(
    tx: &mut LedgerTx,
    member: &Member,
    config: &TierConfig,
    amount: Decimal,
) -> Result<bool, sqlx::Error> {
    let after = tx.add_commission_received(member.id, amount).await?;
    let before = after - amount;

    if ReconsumptionGate::crosses_threshold(before, after, config) {
        tx.set_tier(member.id, Tier::None).await?;
        info!(
            member_id = %member.id,
            total_received = %after,
            threshold = %config.reconsumption_threshold,
            "Reconsumption threshold reached, member suspended"
        );
        return Ok(true);
    }
    Ok(false)
}
