mod common;

use commission_engine::domain::{
    Address, AuditAction, AuditFilter, CommissionKind, CommissionStatus, Decimal, MemberId,
    MilestoneBucket, MilestoneStatus, Tier,
};
use commission_engine::engine::MilestoneOutcome;
use commission_engine::settlement::{MockSettlementClient, SettlementError};
use commission_engine::{PayoutError, PayoutOutcome, ProcessOutcome};
use common::{add_member, confirmed_order, harness, harness_with, set_tier, total, Harness};
use tokio_test::assert_ok;

/// Referrers 1 and 2 earn direct commissions from buyers 10, 11 and 12.
async fn pending_directs(h: &Harness) {
    add_member(&h.repo, 1, None, None).await;
    add_member(&h.repo, 2, None, None).await;
    add_member(&h.repo, 10, None, Some(1)).await;
    add_member(&h.repo, 11, None, Some(1)).await;
    add_member(&h.repo, 12, None, Some(2)).await;
    // Buyers are already active, so no purchase counts toward a milestone.
    for id in [1, 2, 10, 11, 12] {
        set_tier(&h.repo, id, Tier::Tier1).await;
    }

    for (order, buyer, amount) in [(1, 10, 100), (2, 11, 100), (3, 12, 200)] {
        let outcome = h
            .services
            .calculator
            .process(confirmed_order(&h.repo, order, buyer, amount).await)
            .await;
        assert!(matches!(outcome, ProcessOutcome::Processed(_)));
    }
}

#[tokio::test]
async fn test_batch_pays_every_commission_in_one_transfer() {
    let h = harness().await;
    pending_directs(&h).await;

    let outcome = assert_ok!(h.services.payouts.auto_payout(50, None).await);
    let PayoutOutcome::Settled(receipt) = outcome else {
        panic!("expected settled, got {:?}", outcome);
    };
    assert_eq!(receipt.wallets, 2);
    assert_eq!(receipt.commission_ids.len(), 3);
    assert_eq!(receipt.total_amount, Decimal::from(40));

    let transfers = h.mock.transfers_for(&receipt.batch_id).unwrap();
    assert_eq!(transfers.len(), 2);
    let to_first = transfers
        .iter()
        .find(|t| t.address == Address::new("0xwallet1".to_string()))
        .unwrap();
    assert_eq!(to_first.amount, Decimal::from(20));

    for member in [1, 2] {
        let rows = h
            .repo
            .commissions_for_beneficiary(MemberId(member))
            .await
            .unwrap();
        for row in rows {
            assert_eq!(row.status, CommissionStatus::Paid);
            assert_eq!(row.batch_id.as_deref(), Some(receipt.batch_id.as_str()));
            assert_eq!(row.tx_id, receipt.tx_id);
            assert!(row.settled_at.is_some());
        }
    }

    let entries = h
        .services
        .payouts
        .audit()
        .entries(&AuditFilter {
            batch_id: Some(receipt.batch_id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Created, AuditAction::Executed]);

    // Nothing left for the next sweep.
    assert_eq!(
        h.services.payouts.auto_payout(50, None).await.unwrap(),
        PayoutOutcome::NothingToPay
    );
}

#[tokio::test]
async fn test_failed_settlement_leaves_batch_pending() {
    let h = harness().await;
    pending_directs(&h).await;
    h.mock
        .fail_next_submission(SettlementError::NetworkError("connection reset".to_string()));

    let err = h.services.payouts.auto_payout(50, None).await.unwrap_err();
    assert!(matches!(err, PayoutError::Settlement(_)), "got {:?}", err);

    let pending = h.repo.pending_commissions(50, None).await.unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|c| c.batch_id.is_none() && c.tx_id.is_none()));
    assert_eq!(h.mock.submissions(), 0);
    assert_eq!(
        h.repo.count_audit_action(AuditAction::Failed).await.unwrap(),
        1
    );
    assert_eq!(
        h.repo.count_audit_action(AuditAction::Executed).await.unwrap(),
        0
    );

    // A later sweep picks the same commissions up again.
    h.clock.advance_ms(60_000);
    let retried = h.services.payouts.auto_payout(50, None).await.unwrap();
    assert!(matches!(retried, PayoutOutcome::Settled(_)));
    assert!(h.repo.pending_commissions(50, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insufficient_balance_settles_nothing() {
    let h = harness_with(MockSettlementClient::new(Decimal::from(5))).await;
    pending_directs(&h).await;

    let err = h.services.payouts.auto_payout(50, None).await.unwrap_err();
    assert!(matches!(err, PayoutError::InsufficientBalance { .. }));
    assert_eq!(h.repo.pending_commissions(50, None).await.unwrap().len(), 3);

    let stats = h.services.payouts.stats().await.unwrap();
    assert_eq!(stats.batches_failed, 1);
    assert_eq!(stats.settlement_balance, Some(Decimal::from(5)));
    assert!(!stats.payout_running);
}

#[tokio::test]
async fn test_eighth_referral_awards_milestone_once() {
    let h = harness().await;
    add_member(&h.repo, 1, None, None).await;
    for buyer in 2..=9 {
        add_member(&h.repo, buyer, None, Some(1)).await;
        let order = confirmed_order(&h.repo, 100 + buyer, buyer, 100).await;
        let outcome = h.services.pipeline.on_order_confirmed(order).await;
        assert!(matches!(outcome, ProcessOutcome::Processed(_)));
    }

    let milestones = h.repo.list_milestones(MemberId(1)).await.unwrap();
    let counts: Vec<_> = milestones.iter().map(|m| m.milestone_count).collect();
    assert_eq!(counts, vec![2, 4, 6, 8]);

    let eighth = &milestones[3];
    assert_eq!(eighth.reward_kind, MilestoneBucket::X);
    assert_eq!(eighth.reward_amount, Decimal::from(50));
    assert_eq!(eighth.status, MilestoneStatus::Paid);

    // Replaying the activation of member 9 awards nothing new.
    let replay = h
        .services
        .milestones
        .check_referrer(MemberId(1), MemberId(9))
        .await
        .unwrap();
    assert_eq!(
        replay,
        MilestoneOutcome::AlreadyAwarded {
            referrer_id: MemberId(1),
            count: 8
        }
    );

    let rows = h
        .repo
        .commissions_for_beneficiary(MemberId(1))
        .await
        .unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|c| c.kind == CommissionKind::Milestone));
    assert!(rows.iter().all(|c| c.status == CommissionStatus::Paid));
    assert_eq!(total(&rows), Decimal::from(400));
}

#[tokio::test]
async fn test_milestone_without_wallet_waits_for_sweep() {
    let h = harness().await;
    h.repo
        .insert_member(&commission_engine::domain::NewMember {
            id: MemberId(1),
            parent_id: None,
            position: None,
            referrer_id: None,
            wallet_address: None,
        })
        .await
        .unwrap();
    for id in [2, 3] {
        add_member(&h.repo, id, None, Some(1)).await;
        set_tier(&h.repo, id, Tier::Tier1).await;
    }

    let outcome = h.services.pipeline.on_member_registered(MemberId(3)).await.unwrap();
    let MilestoneOutcome::Awarded { settled, commission_id, .. } = outcome else {
        panic!("expected award, got {:?}", outcome);
    };
    assert!(!settled);
    let row = h.repo.get_commission(commission_id).await.unwrap().unwrap();
    assert_eq!(row.status, CommissionStatus::Pending);

    h.repo
        .set_wallet_address(MemberId(1), Some(&Address::new("0xlate".to_string())))
        .await
        .unwrap();
    let swept = h.services.payouts.auto_payout(50, None).await.unwrap();
    assert!(matches!(swept, PayoutOutcome::Settled(_)));
    let milestones = h.repo.list_milestones(MemberId(1)).await.unwrap();
    assert_eq!(milestones[0].status, MilestoneStatus::Paid);
}
