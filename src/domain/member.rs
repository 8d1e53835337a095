//! Member (binary tree node) and its money counters.

use super::{Address, Decimal, LegSide, MemberId, Tier, TierConfig, TimeMs};
use serde::{Deserialize, Serialize};

/// A participant placed in the binary tree.
///
/// `parent_id`/`position` describe placement; `referrer_id` is the original
/// inviter and may differ from the parent when placement spilled over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: MemberId,
    pub parent_id: Option<MemberId>,
    pub position: Option<LegSide>,
    pub referrer_id: Option<MemberId>,
    pub tier: Tier,
    pub wallet_address: Option<Address>,
    pub total_purchase_amount: Decimal,
    pub total_commission_received: Decimal,
    pub total_reconsumption_amount: Decimal,
    pub left_subtree_volume: Decimal,
    pub right_subtree_volume: Decimal,
    pub created_at: TimeMs,
}

impl Member {
    pub fn leg_volume(&self, side: LegSide) -> Decimal {
        match side {
            LegSide::Left => self.left_subtree_volume,
            LegSide::Right => self.right_subtree_volume,
        }
    }

    /// Suspended by the reconsumption rule: tier was forced to `none` after
    /// earning. Members start at `none` with zero commission, and only a
    /// threshold crossing drops an earning member back to `none`.
    pub fn is_suspended(&self) -> bool {
        self.tier == Tier::None && self.total_commission_received.is_positive()
    }

    /// Whether a purchase by this member counts as reconsumption.
    ///
    /// `config` is the config of the member's current tier; it is ignored when
    /// the member is suspended.
    pub fn is_past_threshold(&self, config: &TierConfig) -> bool {
        if self.is_suspended() {
            return true;
        }
        self.tier.is_active()
            && self.total_commission_received >= config.reconsumption_threshold
    }
}

/// Registration payload accepted from the member subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    pub id: MemberId,
    pub parent_id: Option<MemberId>,
    pub position: Option<LegSide>,
    pub referrer_id: Option<MemberId>,
    pub wallet_address: Option<Address>,
}

#[cfg(test)]
pub(crate) fn test_member(id: i64, parent: Option<(i64, LegSide)>, tier: Tier) -> Member {
    Member {
        id: MemberId(id),
        parent_id: parent.map(|(p, _)| MemberId(p)),
        position: parent.map(|(_, s)| s),
        referrer_id: parent.map(|(p, _)| MemberId(p)),
        tier,
        wallet_address: Some(Address::new(format!("0xwallet{}", id))),
        total_purchase_amount: Decimal::zero(),
        total_commission_received: Decimal::zero(),
        total_reconsumption_amount: Decimal::zero(),
        left_subtree_volume: Decimal::zero(),
        right_subtree_volume: Decimal::zero(),
        created_at: TimeMs::new(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suspended_requires_prior_earnings() {
        let mut m = test_member(1, None, Tier::None);
        assert!(!m.is_suspended());

        m.total_commission_received = Decimal::from(5);
        assert!(m.is_suspended());

        m.tier = Tier::Tier1;
        assert!(!m.is_suspended());
    }

    #[test]
    fn test_past_threshold_uses_current_tier_config() {
        let cfg = TierConfig::default_for(Tier::Tier1);
        let mut m = test_member(1, None, Tier::Tier1);
        m.total_commission_received = cfg.reconsumption_threshold - Decimal::one();
        assert!(!m.is_past_threshold(&cfg));

        m.total_commission_received = cfg.reconsumption_threshold;
        assert!(m.is_past_threshold(&cfg));
    }

    #[test]
    fn test_leg_volume() {
        let mut m = test_member(1, None, Tier::Tier2);
        m.left_subtree_volume = Decimal::from(100);
        m.right_subtree_volume = Decimal::from(40);
        assert_eq!(m.leg_volume(LegSide::Left), Decimal::from(100));
        assert_eq!(m.leg_volume(LegSide::Right), Decimal::from(40));
    }
}
