//! Per-order commission computation.
//!
//! One confirmed order runs these phases inside a single ledger transaction:
//! 1. Claim the order (idempotency) and validate it
//! 2. Buyer tier upgrade and reconsumption tracking
//! 3. Direct commission to the referrer
//! 4. Group commission to upline members paid on their weaker leg
//! 5. Leg volume propagation up the tree
//! 6. Referral milestone when the purchase activates the buyer
//! 7. Management cascade over group/milestone recipients
//!
//! Tier configs are resolved before the transaction opens. Any error rolls
//! the whole order back, including the claim, so a later re-trigger
//! recomputes it from scratch.

use super::milestone::{record_milestone, MilestoneOutcome};
use super::reconsumption::credit_commission;
use super::tree::{Lineage, TreeNavigator};
use super::{Clock, CommissionError, ConfigStore, ReconsumptionGate, TierConfigs};
use crate::db::{LedgerTx, Repository};
use crate::domain::{
    management_generations, qualifying_tier, CommissionId, CommissionKind, CommissionStatus,
    Decimal, LegSide, Member, MemberId, MilestoneRewards, NewCommission, Order, OrderId, Tier,
    RECONSUMPTION_REQUIRED_NOTE,
};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why an order produced no commissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyProcessed,
    OrderNotFound,
    NotConfirmed,
    BuyerNotFound,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::AlreadyProcessed => "already processed",
            SkipReason::OrderNotFound => "order not found",
            SkipReason::NotConfirmed => "order not confirmed",
            SkipReason::BuyerNotFound => "buyer not found",
        };
        f.write_str(s)
    }
}

/// A commission row written while processing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardedCommission {
    pub id: CommissionId,
    pub beneficiary_id: MemberId,
    pub kind: CommissionKind,
    pub status: CommissionStatus,
    pub amount: Decimal,
    pub level: Option<u8>,
    pub side: Option<LegSide>,
    /// Beneficiary tier at award time.
    pub beneficiary_tier: Tier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub buyer_id: MemberId,
    pub buyer_referrer_id: Option<MemberId>,
    pub order_amount: Decimal,
    pub tier_before: Tier,
    pub tier_after: Tier,
    pub commissions: Vec<AwardedCommission>,
    /// Referral milestone reached through this purchase, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<MilestoneOutcome>,
}

impl OrderSummary {
    pub fn has_pending(&self) -> bool {
        self.commissions
            .iter()
            .any(|c| c.status == CommissionStatus::Pending)
    }

    /// Buyer went from no tier to a paid tier with this order.
    pub fn activated_buyer(&self) -> bool {
        self.tier_before == Tier::None && self.tier_after.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Processed(OrderSummary),
    Skipped { reason: SkipReason },
    Failed { message: String },
}

/// Commission row about to be awarded; rate and status are resolved from the
/// beneficiary's tier at award time.
#[derive(Debug, Clone)]
struct Draft {
    beneficiary_id: MemberId,
    kind: CommissionKind,
    base_amount: Decimal,
    level: Option<u8>,
    side: Option<LegSide>,
    notes: Option<String>,
}

/// Member whose pending commission seeds management income for its upline.
#[derive(Debug, Clone, Copy)]
struct CascadeSource {
    member_id: MemberId,
    tier: Tier,
    amount: Decimal,
}

pub struct CommissionCalculator {
    repo: Arc<Repository>,
    configs: Arc<ConfigStore>,
    rewards: MilestoneRewards,
    clock: Arc<dyn Clock>,
}

impl CommissionCalculator {
    pub fn new(
        repo: Arc<Repository>,
        configs: Arc<ConfigStore>,
        rewards: MilestoneRewards,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            configs,
            rewards,
            clock,
        }
    }

    /// Compute every commission an order generates.
    ///
    /// Never returns an error: failures are logged and reported as
    /// `ProcessOutcome::Failed` so the caller can keep handling other orders.
    /// Calling this twice for one order yields commissions exactly once.
    pub async fn process(&self, order_id: OrderId) -> ProcessOutcome {
        match self.try_process(order_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Commission computation failed");
                ProcessOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn try_process(&self, order_id: OrderId) -> Result<ProcessOutcome, CommissionError> {
        let configs = self.configs.snapshot().await?;

        // The claim is the first statement so the transaction holds the
        // write lock from the start.
        let mut tx = self.repo.begin_ledger(self.clock.now()).await?;

        if !tx.claim_order(order_id).await? || tx.order_has_commissions(order_id).await? {
            tx.rollback().await?;
            debug!(order_id = %order_id, "Order already processed");
            return Ok(skipped(SkipReason::AlreadyProcessed));
        }

        let Some(order) = tx.get_order(order_id).await? else {
            tx.rollback().await?;
            warn!(order_id = %order_id, "Order not found");
            return Ok(skipped(SkipReason::OrderNotFound));
        };
        if !order.is_confirmed() {
            tx.rollback().await?;
            info!(order_id = %order_id, status = %order.status.as_str(), "Order not confirmed, skipping");
            return Ok(skipped(SkipReason::NotConfirmed));
        }
        let Some(buyer) = tx.get_member(order.buyer_id).await? else {
            tx.rollback().await?;
            warn!(order_id = %order_id, buyer_id = %order.buyer_id, "Buyer not found");
            return Ok(skipped(SkipReason::BuyerNotFound));
        };

        let mut awarded = Vec::new();
        let tier_after = update_buyer_tier(&mut tx, &configs, &buyer, order.amount).await?;
        direct_commission(&mut tx, &configs, &order, &buyer, &mut awarded).await?;

        let lineage = TreeNavigator::lineage(&mut tx, &buyer).await?;
        group_commission(&mut tx, &configs, &order, &lineage, &mut awarded).await?;
        propagate_volume(&mut tx, &lineage, order.amount).await?;

        let milestone = if buyer.tier == Tier::None && tier_after.is_active() {
            self.activation_milestone(&mut tx, &configs, &order, &buyer, &mut awarded)
                .await?
        } else {
            None
        };
        management_commission(&mut tx, &configs, &order, &buyer, &mut awarded).await?;

        tx.commit().await?;

        let total: Decimal = awarded.iter().map(|c| c.amount).sum();
        info!(
            order_id = %order_id,
            buyer_id = %buyer.id,
            commissions = awarded.len(),
            total = %total,
            tier = %tier_after,
            "Order commissions computed"
        );

        Ok(ProcessOutcome::Processed(OrderSummary {
            order_id,
            buyer_id: buyer.id,
            buyer_referrer_id: buyer.referrer_id,
            order_amount: order.amount,
            tier_before: buyer.tier,
            tier_after,
            commissions: awarded,
            milestone,
        }))
    }

    /// Activation adds one to the referrer's active-referral count; award the
    /// milestone here so its row seeds the management cascade.
    async fn activation_milestone(
        &self,
        tx: &mut LedgerTx,
        configs: &TierConfigs,
        order: &Order,
        buyer: &Member,
        awarded: &mut Vec<AwardedCommission>,
    ) -> Result<Option<MilestoneOutcome>, CommissionError> {
        let Some(referrer_id) = buyer.referrer_id.filter(|r| *r != buyer.id) else {
            return Ok(None);
        };
        let Some(referrer) = tx.get_member(referrer_id).await? else {
            warn!(member_id = %buyer.id, referrer_id = %referrer_id, "Referrer not found, no milestone check");
            return Ok(None);
        };

        let count = tx.count_active_referrals(referrer_id).await?;
        let outcome = record_milestone(
            tx,
            &self.rewards,
            configs,
            referrer_id,
            count,
            buyer.id,
            Some(order.id),
        )
        .await?;
        if let MilestoneOutcome::Awarded {
            commission_id,
            amount,
            ..
        } = outcome
        {
            awarded.push(AwardedCommission {
                id: commission_id,
                beneficiary_id: referrer_id,
                kind: CommissionKind::Milestone,
                status: CommissionStatus::Pending,
                amount,
                level: None,
                side: None,
                beneficiary_tier: referrer.tier,
            });
        }
        Ok(Some(outcome))
    }
}

/// Record the purchase and upgrade the buyer's tier. Tiers never drop here.
async fn update_buyer_tier(
    tx: &mut LedgerTx,
    configs: &TierConfigs,
    buyer: &Member,
    amount: Decimal,
) -> Result<Tier, CommissionError> {
    let current = configs.get(buyer.tier);
    let reconsumption = buyer.is_past_threshold(current);

    tx.add_purchase(buyer.id, amount).await?;
    if reconsumption {
        tx.add_reconsumption(buyer.id, amount).await?;
        debug!(member_id = %buyer.id, amount = %amount, "Purchase counted as reconsumption");
    }

    // A suspended member requalifies on the new purchase alone.
    let basis = if buyer.is_suspended() {
        amount
    } else {
        buyer.total_purchase_amount + amount
    };
    let qualified = qualifying_tier(basis, configs.paid());

    if qualified > buyer.tier {
        tx.set_tier(buyer.id, qualified).await?;
        info!(member_id = %buyer.id, from = %buyer.tier, to = %qualified, "Member tier upgraded");
        Ok(qualified)
    } else {
        Ok(buyer.tier)
    }
}

async fn direct_commission(
    tx: &mut LedgerTx,
    configs: &TierConfigs,
    order: &Order,
    buyer: &Member,
    awarded: &mut Vec<AwardedCommission>,
) -> Result<(), CommissionError> {
    let Some(referrer_id) = buyer.referrer_id else {
        return Ok(());
    };
    if referrer_id == buyer.id {
        warn!(member_id = %buyer.id, "Member refers itself, skipping direct commission");
        return Ok(());
    }

    let draft = Draft {
        beneficiary_id: referrer_id,
        kind: CommissionKind::Direct,
        base_amount: order.amount,
        level: None,
        side: None,
        notes: None,
    };
    if let Some(c) = award(tx, configs, order, buyer.id, draft).await? {
        awarded.push(c);
    }
    Ok(())
}

/// Pays ancestors whose weaker leg (by volume before this order) holds
/// the buyer. Ancestors with an empty leg or no volume yet are skipped.
async fn group_commission(
    tx: &mut LedgerTx,
    configs: &TierConfigs,
    order: &Order,
    lineage: &[Lineage],
    awarded: &mut Vec<AwardedCommission>,
) -> Result<(), CommissionError> {
    for step in lineage {
        let ancestor_id = step.ancestor.id;
        if !step.ancestor.tier.is_active() {
            continue;
        }
        if !TreeNavigator::both_subtrees_populated(tx, ancestor_id).await? {
            continue;
        }
        if step.ancestor.left_subtree_volume.is_zero()
            && step.ancestor.right_subtree_volume.is_zero()
        {
            debug!(member_id = %ancestor_id, "No leg volume yet, no group commission");
            continue;
        }

        let weak = TreeNavigator::weak_side(tx, ancestor_id).await?;
        if weak.is_some_and(|w| w != step.side) {
            continue;
        }

        let draft = Draft {
            beneficiary_id: ancestor_id,
            kind: CommissionKind::Group,
            base_amount: order.amount,
            level: None,
            side: Some(step.side),
            notes: Some(format!("{} leg", step.side)),
        };
        if let Some(c) = award(tx, configs, order, order.buyer_id, draft).await? {
            awarded.push(c);
        }
    }
    Ok(())
}

/// Management income for the upline of every group or milestone
/// recipient within three generations of the buyer.
///
/// Pending management rows cascade in turn. Each member is expanded at
/// most once per order, which bounds the cascade on any tree shape.
async fn management_commission(
    tx: &mut LedgerTx,
    configs: &TierConfigs,
    order: &Order,
    buyer: &Member,
    awarded: &mut Vec<AwardedCommission>,
) -> Result<(), CommissionError> {
    let seeds = tx
        .pending_commissions_of_kind(
            order.id,
            &[CommissionKind::Group, CommissionKind::Milestone],
        )
        .await?;

    let mut expanded = HashSet::new();
    let mut queue = VecDeque::new();
    for seed in seeds {
        if TreeNavigator::generation_level(tx, buyer, seed.beneficiary_id)
            .await?
            .is_none()
        {
            continue;
        }
        if !expanded.insert(seed.beneficiary_id) {
            continue;
        }
        let tier = match awarded.iter().find(|c| c.id == seed.id) {
            Some(c) => c.beneficiary_tier,
            None => match tx.get_member(seed.beneficiary_id).await? {
                Some(m) => m.tier,
                None => continue,
            },
        };
        queue.push_back(CascadeSource {
            member_id: seed.beneficiary_id,
            tier,
            amount: seed.amount,
        });
    }

    while let Some(source) = queue.pop_front() {
        let generations = usize::from(management_generations(source.tier));
        if generations == 0 {
            continue;
        }
        let Some(member) = tx.get_member(source.member_id).await? else {
            warn!(member_id = %source.member_id, "Cascade source vanished");
            continue;
        };

        let upline = TreeNavigator::ancestors_of(tx, &member).await?;
        for (idx, payee) in upline.iter().take(generations).enumerate() {
            let level = idx as u8 + 1;
            let draft = Draft {
                beneficiary_id: payee.id,
                kind: CommissionKind::Management,
                base_amount: source.amount,
                level: Some(level),
                side: None,
                notes: Some(format!("F{} on member {}", level, source.member_id)),
            };
            let Some(c) = award(tx, configs, order, order.buyer_id, draft).await? else {
                continue;
            };
            if c.status == CommissionStatus::Pending && expanded.insert(c.beneficiary_id) {
                queue.push_back(CascadeSource {
                    member_id: c.beneficiary_id,
                    tier: c.beneficiary_tier,
                    amount: c.amount,
                });
            }
            awarded.push(c);
        }
    }
    Ok(())
}

/// Write one commission row for `draft`.
///
/// Beneficiaries without a tier get nothing. Gate-blocked beneficiaries
/// get a `blocked` row that is never credited or settled. Eligible ones
/// are credited immediately, which may suspend them.
async fn award(
    tx: &mut LedgerTx,
    configs: &TierConfigs,
    order: &Order,
    source_member: MemberId,
    draft: Draft,
) -> Result<Option<AwardedCommission>, CommissionError> {
    let Some(member) = tx.get_member(draft.beneficiary_id).await? else {
        warn!(member_id = %draft.beneficiary_id, kind = %draft.kind.as_str(), "Beneficiary not found");
        return Ok(None);
    };
    if !member.tier.is_active() {
        return Ok(None);
    }

    let config = configs.get(member.tier);
    let rate = match draft.kind {
        CommissionKind::Direct => config.direct_rate,
        CommissionKind::Group => config.group_rate,
        CommissionKind::Management => config.management_rate(draft.level.unwrap_or(0)),
        CommissionKind::Milestone => Decimal::one(),
    };
    let amount = (draft.base_amount * rate).to_money();
    if !amount.is_positive() {
        return Ok(None);
    }

    let eligible = ReconsumptionGate::check(&member, config);
    let (status, notes) = if eligible {
        (CommissionStatus::Pending, draft.notes)
    } else {
        let note = match draft.notes {
            Some(n) => format!("{}; {}", RECONSUMPTION_REQUIRED_NOTE, n),
            None => RECONSUMPTION_REQUIRED_NOTE.to_string(),
        };
        (CommissionStatus::Blocked, Some(note))
    };

    let id = tx
        .insert_commission(&NewCommission {
            beneficiary_id: member.id,
            order_id: Some(order.id),
            source_member_id: Some(source_member),
            kind: draft.kind,
            status,
            amount,
            order_amount: order.amount,
            level: draft.level,
            side: draft.side,
            notes,
        })
        .await?;

    if eligible {
        credit_commission(tx, &member, config, amount).await?;
    } else {
        debug!(member_id = %member.id, kind = %draft.kind.as_str(), amount = %amount, "Commission blocked pending reconsumption");
    }

    Ok(Some(AwardedCommission {
        id,
        beneficiary_id: member.id,
        kind: draft.kind,
        status,
        amount,
        level: draft.level,
        side: draft.side,
        beneficiary_tier: member.tier,
    }))
}

async fn propagate_volume(
    tx: &mut LedgerTx,
    lineage: &[Lineage],
    amount: Decimal,
) -> Result<(), CommissionError> {
    for step in lineage {
        tx.add_leg_volume(step.ancestor.id, step.side, amount).await?;
    }
    Ok(())
}

fn skipped(reason: SkipReason) -> ProcessOutcome {
    ProcessOutcome::Skipped { reason }
}
