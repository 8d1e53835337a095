//! Referral milestone rewards.

use super::reconsumption::credit_commission;
use super::{Clock, CommissionError, ConfigStore, TierConfigs};
use crate::db::{LedgerTx, Repository};
use crate::domain::{
    CommissionId, CommissionKind, CommissionStatus, Decimal, MemberId, MilestoneBucket,
    MilestoneRewards, NewCommission, OrderId,
};
use crate::payout::{PayoutBatcher, PayoutOutcome};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MilestoneOutcome {
    /// The member has no referrer to reward.
    NoReferrer,
    /// Referral count is not a milestone.
    NotMilestone { referrer_id: MemberId, count: i64 },
    /// This milestone was rewarded before.
    AlreadyAwarded { referrer_id: MemberId, count: i64 },
    #[serde(rename_all = "camelCase")]
    Awarded {
        referrer_id: MemberId,
        count: i64,
        bucket: MilestoneBucket,
        commission_id: CommissionId,
        amount: Decimal,
        /// False when immediate settlement did not happen; the reward stays
        /// pending for the next payout sweep.
        settled: bool,
    },
}

/// Write the reward for `referrer_id` reaching `count` active referrals.
///
/// The milestone insert is the first write, so a caller that has not written
/// yet takes the write lock here. The reward row is always `pending` and is
/// not gated; settlement happens after the caller commits. `order_id` ties
/// the reward to the purchase that triggered it.
pub(crate) async fn record_milestone(
    tx: &mut LedgerTx,
    rewards: &MilestoneRewards,
    configs: &TierConfigs,
    referrer_id: MemberId,
    count: i64,
    source_member: MemberId,
    order_id: Option<OrderId>,
) -> Result<MilestoneOutcome, CommissionError> {
    let Some(bucket) = MilestoneBucket::for_count(count) else {
        debug!(referrer_id = %referrer_id, count, "Referral count is not a milestone");
        return Ok(MilestoneOutcome::NotMilestone { referrer_id, count });
    };
    let amount = rewards.amount_for(bucket).to_money();

    if !tx
        .insert_milestone(referrer_id, count, amount, bucket)
        .await?
    {
        debug!(referrer_id = %referrer_id, count, "Milestone already awarded");
        return Ok(MilestoneOutcome::AlreadyAwarded { referrer_id, count });
    }
    let referrer = tx
        .get_member(referrer_id)
        .await?
        .ok_or(CommissionError::MemberNotFound(referrer_id))?;

    let commission_id = tx
        .insert_commission(&NewCommission {
            beneficiary_id: referrer_id,
            order_id,
            source_member_id: Some(source_member),
            kind: CommissionKind::Milestone,
            status: CommissionStatus::Pending,
            amount,
            order_amount: Decimal::zero(),
            level: None,
            side: None,
            notes: Some(format!("referral milestone {} ({})", count, bucket.as_str())),
        })
        .await?;
    tx.link_milestone_commission(referrer_id, count, commission_id)
        .await?;
    credit_commission(tx, &referrer, configs.get(referrer.tier), amount).await?;

    info!(
        referrer_id = %referrer_id,
        count,
        bucket = bucket.as_str(),
        amount = %amount,
        order_id = ?order_id,
        "Referral milestone awarded"
    );
    Ok(MilestoneOutcome::Awarded {
        referrer_id,
        count,
        bucket,
        commission_id,
        amount,
        settled: false,
    })
}

pub struct MilestoneEngine {
    repo: Arc<Repository>,
    configs: Arc<ConfigStore>,
    payouts: Arc<PayoutBatcher>,
    rewards: MilestoneRewards,
    clock: Arc<dyn Clock>,
}

impl MilestoneEngine {
    pub fn new(
        repo: Arc<Repository>,
        configs: Arc<ConfigStore>,
        payouts: Arc<PayoutBatcher>,
        rewards: MilestoneRewards,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            configs,
            payouts,
            rewards,
            clock,
        }
    }

    /// Handle a new registration by checking the new member's referrer.
    pub async fn on_registration(
        &self,
        member_id: MemberId,
    ) -> Result<MilestoneOutcome, CommissionError> {
        let member = self
            .repo
            .get_member(member_id)
            .await?
            .ok_or(CommissionError::MemberNotFound(member_id))?;
        match member.referrer_id {
            Some(referrer_id) => self.check_referrer(referrer_id, member_id).await,
            None => Ok(MilestoneOutcome::NoReferrer),
        }
    }

    /// Award `referrer_id` if their active referral count sits on a milestone.
    ///
    /// The `(referrer, count)` pair is unique, so replaying an event awards
    /// nothing twice. Purchases that activate a member award their
    /// milestone inside the order's own ledger instead.
    pub async fn check_referrer(
        &self,
        referrer_id: MemberId,
        source_member: MemberId,
    ) -> Result<MilestoneOutcome, CommissionError> {
        let count = self.repo.count_active_referrals(referrer_id).await?;
        if MilestoneBucket::for_count(count).is_none() {
            debug!(referrer_id = %referrer_id, count, "Referral count is not a milestone");
            return Ok(MilestoneOutcome::NotMilestone { referrer_id, count });
        }
        let configs = self.configs.snapshot().await?;

        let mut tx = self.repo.begin_ledger(self.clock.now()).await?;
        let mut outcome = match record_milestone(
            &mut tx,
            &self.rewards,
            &configs,
            referrer_id,
            count,
            source_member,
            None,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };
        let MilestoneOutcome::Awarded { commission_id, .. } = outcome else {
            tx.rollback().await?;
            return Ok(outcome);
        };
        tx.commit().await?;

        if let MilestoneOutcome::Awarded { settled, .. } = &mut outcome {
            *settled = self.settle_now(commission_id).await;
        }
        Ok(outcome)
    }

    /// Try to pay a freshly awarded milestone right away. Returns whether it
    /// settled; otherwise it stays pending for the next sweep.
    pub async fn settle_now(&self, commission_id: CommissionId) -> bool {
        match self.payouts.settle_commissions(&[commission_id]).await {
            Ok(PayoutOutcome::Settled(receipt)) => {
                debug!(commission_id = %commission_id, tx_id = ?receipt.tx_id, "Milestone settled");
                true
            }
            Ok(other) => {
                info!(commission_id = %commission_id, outcome = ?other, "Milestone left pending");
                false
            }
            Err(e) => {
                warn!(commission_id = %commission_id, error = %e, "Milestone settlement failed, left pending");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{new_member, setup_repo};
    use crate::domain::{LegSide, MilestoneStatus, Tier, TimeMs};
    use crate::engine::ManualClock;
    use crate::payout::AuditTrail;
    use crate::settlement::{MockSettlementClient, SettlementClient};
    use std::time::Duration;

    struct Fixture {
        repo: Arc<Repository>,
        engine: MilestoneEngine,
        mock: Arc<MockSettlementClient>,
        _temp: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let (repo, temp) = setup_repo().await;
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(TimeMs::new(5_000)));
        let configs = Arc::new(ConfigStore::new(
            repo.clone(),
            clock.clone(),
            Duration::from_secs(300),
        ));
        let mock = Arc::new(MockSettlementClient::default());
        let client: Arc<dyn SettlementClient> = mock.clone();
        let payouts = Arc::new(PayoutBatcher::new(
            repo.clone(),
            client,
            AuditTrail::new(repo.clone()),
            clock.clone(),
        ));
        let engine = MilestoneEngine::new(
            repo.clone(),
            configs,
            payouts,
            MilestoneRewards::default(),
            clock,
        );
        Fixture {
            repo,
            engine,
            mock,
            _temp: temp,
        }
    }

    /// Referrer 1 with `n` tiered referrals, ids 100.. placed as a chain.
    async fn referrals(repo: &Repository, n: i64) {
        repo.insert_member(&new_member(1, None, None)).await.unwrap();
        let mut parent = 1;
        for i in 0..n {
            let id = 100 + i;
            repo.insert_member(&new_member(id, Some((parent, LegSide::Left)), Some(1)))
                .await
                .unwrap();
            repo.set_member_tier(MemberId(id), Tier::Tier1).await.unwrap();
            parent = id;
        }
    }

    #[tokio::test]
    async fn test_odd_count_is_not_a_milestone() {
        let f = fixture().await;
        referrals(&f.repo, 3).await;
        let outcome = f.engine.on_registration(MemberId(102)).await.unwrap();
        assert_eq!(
            outcome,
            MilestoneOutcome::NotMilestone {
                referrer_id: MemberId(1),
                count: 3
            }
        );
    }

    #[tokio::test]
    async fn test_milestone_awarded_once_and_settled() {
        let f = fixture().await;
        referrals(&f.repo, 8).await;

        let first = f.engine.on_registration(MemberId(107)).await.unwrap();
        let MilestoneOutcome::Awarded {
            bucket,
            amount,
            settled,
            commission_id,
            ..
        } = first
        else {
            panic!("expected award, got {:?}", first);
        };
        assert_eq!(bucket, MilestoneBucket::X);
        assert_eq!(amount, Decimal::from(50));
        assert!(settled);
        assert_eq!(f.mock.submissions(), 1);

        let again = f.engine.on_registration(MemberId(107)).await.unwrap();
        assert_eq!(
            again,
            MilestoneOutcome::AlreadyAwarded {
                referrer_id: MemberId(1),
                count: 8
            }
        );

        let milestones = f.repo.list_milestones(MemberId(1)).await.unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].status, MilestoneStatus::Paid);
        assert_eq!(milestones[0].commission_id, Some(commission_id));

        let commission = f.repo.get_commission(commission_id).await.unwrap().unwrap();
        assert_eq!(commission.status, CommissionStatus::Paid);
        assert_eq!(commission.order_id, None);
    }

    #[tokio::test]
    async fn test_missing_wallet_leaves_milestone_pending() {
        let f = fixture().await;
        referrals(&f.repo, 2).await;
        f.repo.set_wallet_address(MemberId(1), None).await.unwrap();

        let outcome = f.engine.on_registration(MemberId(101)).await.unwrap();
        assert!(matches!(
            outcome,
            MilestoneOutcome::Awarded { settled: false, .. }
        ));
        assert_eq!(f.mock.submissions(), 0);

        let milestones = f.repo.list_milestones(MemberId(1)).await.unwrap();
        assert_eq!(milestones[0].status, MilestoneStatus::Pending);
    }
}
