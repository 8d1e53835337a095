//! Groups pending commissions by wallet and settles them as one batch.
//!
//! A batch is all-or-nothing: the commissions are reserved inside a ledger
//! transaction, the settlement client is called, and only a confirmed
//! receipt lets the transaction commit them as `paid`. Any failure rolls the
//! reservation back and leaves every commission `pending`.

use super::{AuditTrail, BatchReceipt, PayoutError, PayoutOutcome, PayoutStats};
use crate::db::{LedgerTx, Repository};
use crate::domain::{
    compute_batch_id, transfers_for, Address, AuditAction, BatchRecipients, Commission,
    CommissionId, Decimal, MemberId, OrderId, TimeMs,
};
use crate::engine::Clock;
use crate::settlement::{SettlementClient, SettlementError, SettlementReceipt};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Recent failed batches re-checked before each payout.
const IN_DOUBT_LOOKBACK: i64 = 20;

pub struct PayoutBatcher {
    repo: Arc<Repository>,
    client: Arc<dyn SettlementClient>,
    audit: AuditTrail,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
}

/// Releases the single-sweep flag on drop.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PayoutBatcher {
    pub fn new(
        repo: Arc<Repository>,
        client: Arc<dyn SettlementClient>,
        audit: AuditTrail,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            client,
            audit,
            clock,
            running: AtomicBool::new(false),
        }
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Whether a payout is in flight right now.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Oldest pending commissions, optionally above a minimum amount.
    pub async fn pending_commissions(
        &self,
        limit: i64,
        min_amount: Option<Decimal>,
    ) -> Result<Vec<Commission>, PayoutError> {
        Ok(self.repo.pending_commissions(limit, min_amount).await?)
    }

    /// Group commissions by their beneficiary's payout address.
    ///
    /// Commissions whose beneficiary has no address are left out and stay
    /// pending.
    pub async fn group_by_wallet(
        &self,
        commissions: &[Commission],
    ) -> Result<BatchRecipients, PayoutError> {
        let mut addresses: HashMap<MemberId, Option<Address>> = HashMap::new();
        let mut recipients = BatchRecipients::new();

        for commission in commissions {
            let beneficiary = commission.beneficiary_id;
            let address = match addresses.get(&beneficiary) {
                Some(cached) => cached.clone(),
                None => {
                    let fetched = self.repo.get_payout_address(beneficiary).await?;
                    addresses.insert(beneficiary, fetched.clone());
                    fetched
                }
            };
            let Some(address) = address else {
                warn!(
                    commission_id = %commission.id,
                    member_id = %beneficiary,
                    "No payout address, commission stays pending"
                );
                continue;
            };

            let group = recipients.entry(address).or_default();
            group.total_amount += commission.amount;
            group.commission_ids.push(commission.id);
        }

        Ok(recipients)
    }

    /// Settle one batch atomically and audit the attempt.
    ///
    /// Writes a `created` entry before settlement and exactly one `executed`
    /// or `failed` entry after it. A failure that may have moved funds is
    /// flagged `outcomeUnknown` so the next payout can reconcile it.
    pub async fn execute_batch(
        &self,
        recipients: &BatchRecipients,
    ) -> Result<BatchReceipt, PayoutError> {
        let now = self.clock.now();
        let batch_id = compute_batch_id(recipients);
        let commission_ids: Vec<CommissionId> = recipients
            .values()
            .flat_map(|g| g.commission_ids.iter().copied())
            .collect();

        self.audit
            .record(
                Some(&batch_id),
                AuditAction::Created,
                &format!(
                    "Batch created for {} wallets, {} commissions",
                    recipients.len(),
                    commission_ids.len()
                ),
                json!({
                    "recipients": recipients_metadata(recipients),
                    "commissionIds": commission_ids,
                }),
            )
            .await;

        match self.settle(&batch_id, recipients, &commission_ids, now).await {
            Ok(receipt) => {
                let description = match &receipt.tx_id {
                    Some(tx_id) => format!("Batch settled in {}", tx_id),
                    None => "Batch already processed by settlement, reconciled".to_string(),
                };
                self.audit
                    .record(
                        Some(&batch_id),
                        AuditAction::Executed,
                        &description,
                        json!({
                            "txId": receipt.tx_id,
                            "blockRef": receipt.block_ref,
                            "commissionIds": receipt.commission_ids,
                            "totalAmount": receipt.total_amount,
                            "reconciled": receipt.reconciled,
                        }),
                    )
                    .await;
                info!(
                    batch_id = %batch_id,
                    tx_id = ?receipt.tx_id,
                    wallets = receipt.wallets,
                    commissions = receipt.commission_ids.len(),
                    total = %receipt.total_amount,
                    reconciled = receipt.reconciled,
                    "Settlement batch executed"
                );
                Ok(receipt)
            }
            Err(e) => {
                let outcome_unknown = e.outcome_unknown();
                self.audit
                    .record(
                        Some(&batch_id),
                        AuditAction::Failed,
                        &format!("Batch failed: {}", e),
                        json!({
                            "error": e.to_string(),
                            "commissionIds": commission_ids,
                            "outcomeUnknown": outcome_unknown,
                        }),
                    )
                    .await;
                error!(
                    batch_id = %batch_id,
                    error = %e,
                    outcome_unknown,
                    "Settlement batch failed, commissions left pending"
                );
                Err(e)
            }
        }
    }

    async fn settle(
        &self,
        batch_id: &str,
        recipients: &BatchRecipients,
        commission_ids: &[CommissionId],
        now: TimeMs,
    ) -> Result<BatchReceipt, PayoutError> {
        let mut tx = self.repo.begin_ledger(now).await?;
        let receipt = match self
            .settle_reserved(&mut tx, batch_id, recipients, commission_ids)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(batch_id = %batch_id, error = %rollback, "Rollback of failed batch errored");
                }
                return Err(e);
            }
        };

        let reconciled = receipt.is_none();
        let (tx_id, block_ref) = match receipt {
            Some(r) => (Some(r.tx_id), r.block_ref),
            None => (None, None),
        };
        tx.commit()
            .await
            .map_err(|source| PayoutError::CommitAfterSettlement {
                batch_id: batch_id.to_string(),
                tx_id: tx_id.clone(),
                source,
            })?;

        Ok(BatchReceipt {
            batch_id: batch_id.to_string(),
            tx_id,
            block_ref,
            wallets: recipients.len(),
            commission_ids: commission_ids.to_vec(),
            total_amount: recipients.values().map(|g| g.total_amount).sum(),
            reconciled,
        })
    }

    /// Reserve, submit and mark paid inside `tx`. Nothing is visible to
    /// other readers until the caller commits.
    ///
    /// Returns None when the settlement side already holds this batch: the
    /// commissions are marked paid without a second transfer.
    async fn settle_reserved(
        &self,
        tx: &mut LedgerTx,
        batch_id: &str,
        recipients: &BatchRecipients,
        commission_ids: &[CommissionId],
    ) -> Result<Option<SettlementReceipt>, PayoutError> {
        // Reservation is the first write so the transaction holds the write
        // lock while the settlement call is in flight.
        let reserved = tx.reserve_for_batch(batch_id, commission_ids).await?;
        if reserved == 0 {
            return Err(PayoutError::NothingPending);
        }
        // The id hashes the full set; a partly paid set must be reloaded.
        if reserved != commission_ids.len() as u64 {
            return Err(PayoutError::StaleBatch(batch_id.to_string()));
        }

        if self.client.is_batch_processed(batch_id).await? {
            let paid = tx.mark_batch_paid(batch_id, None).await?;
            warn!(batch_id = %batch_id, paid, "Batch already processed by settlement, reconciling");
            return Ok(None);
        }

        let transfers = transfers_for(recipients);
        let required: Decimal = transfers.iter().map(|t| t.amount).sum();
        let available = self.client.balance().await?;
        if available < required {
            return Err(PayoutError::InsufficientBalance {
                required,
                available,
            });
        }

        let receipt = match self.client.submit_batch(batch_id, &transfers).await {
            Ok(receipt) => receipt,
            Err(SettlementError::AlreadyProcessed(_)) => {
                let paid = tx.mark_batch_paid(batch_id, None).await?;
                warn!(batch_id = %batch_id, paid, "Settlement reports batch already processed, reconciling");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let paid = tx.mark_batch_paid(batch_id, Some(&receipt.tx_id)).await?;
        debug!(batch_id = %batch_id, paid, "Batch commissions marked paid");
        Ok(Some(receipt))
    }

    /// Close out failed batches whose submission outcome was never learned.
    ///
    /// A batch audited as `failed` with `outcomeUnknown` whose commissions
    /// are still pending is looked up on the settlement side. If it went
    /// through, those commissions are marked paid under its id instead of
    /// going out again in a new batch.
    async fn reconcile_in_doubt(&self) -> Result<(), PayoutError> {
        let failed = self
            .repo
            .recent_audit(AuditAction::Failed, IN_DOUBT_LOOKBACK)
            .await?;
        let mut checked = HashSet::new();

        for entry in failed {
            if entry.metadata["outcomeUnknown"].as_bool() != Some(true) {
                continue;
            }
            let Some(batch_id) = entry.batch_id else {
                continue;
            };
            if !checked.insert(batch_id.clone()) {
                continue;
            }
            let ids: Vec<CommissionId> =
                match serde_json::from_value(entry.metadata["commissionIds"].clone()) {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!(batch_id = %batch_id, error = %e, "Unreadable commission ids in failed batch");
                        continue;
                    }
                };
            let still_pending: Vec<CommissionId> = self
                .repo
                .pending_commissions_by_ids(&ids)
                .await?
                .iter()
                .map(|c| c.id)
                .collect();
            if still_pending.is_empty() {
                continue;
            }
            if !self.client.is_batch_processed(&batch_id).await? {
                debug!(batch_id = %batch_id, "Failed batch never reached settlement");
                continue;
            }

            let mut tx = self.repo.begin_ledger(self.clock.now()).await?;
            tx.reserve_for_batch(&batch_id, &still_pending).await?;
            let paid = tx.mark_batch_paid(&batch_id, None).await?;
            tx.commit().await?;

            self.audit
                .record(
                    Some(&batch_id),
                    AuditAction::Executed,
                    "Batch found processed by settlement after a lost outcome, reconciled",
                    json!({
                        "txId": null,
                        "commissionIds": still_pending,
                        "reconciled": true,
                    }),
                )
                .await;
            warn!(batch_id = %batch_id, paid, "In-doubt batch was settled, commissions reconciled");
        }
        Ok(())
    }

    /// Periodic sweep: settle up to `batch_size` of the oldest pending
    /// commissions in one batch.
    pub async fn auto_payout(
        &self,
        batch_size: i64,
        min_amount: Option<Decimal>,
    ) -> Result<PayoutOutcome, PayoutError> {
        let Some(_guard) = self.try_begin() else {
            return Ok(PayoutOutcome::Busy);
        };
        self.reconcile_in_doubt().await?;
        let pending = self.pending_commissions(batch_size, min_amount).await?;
        self.settle_loaded(pending).await
    }

    /// Settle the pending commissions of one order.
    pub async fn payout_for_order(&self, order_id: OrderId) -> Result<PayoutOutcome, PayoutError> {
        let Some(_guard) = self.try_begin() else {
            return Ok(PayoutOutcome::Busy);
        };
        self.reconcile_in_doubt().await?;
        let pending = self.repo.pending_commissions_for_order(order_id).await?;
        self.settle_loaded(pending).await
    }

    /// Settle an explicit set of commissions. Ids that are not pending are
    /// ignored.
    pub async fn settle_commissions(
        &self,
        ids: &[CommissionId],
    ) -> Result<PayoutOutcome, PayoutError> {
        let Some(_guard) = self.try_begin() else {
            return Ok(PayoutOutcome::Busy);
        };
        self.reconcile_in_doubt().await?;
        let pending = self.repo.pending_commissions_by_ids(ids).await?;
        self.settle_loaded(pending).await
    }

    /// Mark one pending or blocked commission paid without settlement.
    pub async fn approve(&self, id: CommissionId) -> Result<Option<Commission>, PayoutError> {
        let Some(commission) = self
            .repo
            .approve_commission(id, "manually approved")
            .await?
        else {
            return Ok(None);
        };

        self.audit
            .record(
                None,
                AuditAction::AdminApproval,
                &format!("Commission {} approved manually", id),
                json!({
                    "commissionId": id,
                    "beneficiaryId": commission.beneficiary_id,
                    "amount": commission.amount,
                }),
            )
            .await;
        info!(commission_id = %id, amount = %commission.amount, "Commission approved manually");
        Ok(Some(commission))
    }

    pub async fn stats(&self) -> Result<PayoutStats, PayoutError> {
        let (totals, batches_executed, batches_failed) = futures::try_join!(
            self.repo.commission_totals(),
            self.repo.count_audit_action(AuditAction::Executed),
            self.repo.count_audit_action(AuditAction::Failed),
        )?;
        let settlement_balance = match self.client.balance().await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(error = %e, "Settlement balance unavailable");
                None
            }
        };

        Ok(PayoutStats {
            totals,
            batches_executed,
            batches_failed,
            settlement_balance,
            payout_running: self.is_running(),
        })
    }

    async fn settle_loaded(&self, pending: Vec<Commission>) -> Result<PayoutOutcome, PayoutError> {
        if pending.is_empty() {
            return Ok(PayoutOutcome::NothingToPay);
        }
        let recipients = self.group_by_wallet(&pending).await?;
        if recipients.is_empty() {
            return Ok(PayoutOutcome::NothingToPay);
        }
        self.execute_batch(&recipients)
            .await
            .map(PayoutOutcome::Settled)
    }

    fn try_begin(&self) -> Option<SweepGuard<'_>> {
        match self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Some(SweepGuard(&self.running)),
            Err(_) => {
                info!("Payout already in progress, skipping");
                None
            }
        }
    }
}

fn recipients_metadata(recipients: &BatchRecipients) -> serde_json::Value {
    recipients
        .iter()
        .map(|(address, group)| {
            json!({
                "address": address,
                "amount": group.total_amount,
                "commissionIds": group.commission_ids,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{new_member, setup_repo};
    use crate::domain::{CommissionKind, CommissionStatus, NewCommission};
    use crate::engine::ManualClock;
    use crate::domain::{AuditFilter, SettlementTransfer};
    use crate::settlement::MockSettlementClient;
    use async_trait::async_trait;

    struct Fixture {
        repo: Arc<Repository>,
        batcher: PayoutBatcher,
        mock: Arc<MockSettlementClient>,
        _temp: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let mock = Arc::new(MockSettlementClient::default());
        let client: Arc<dyn SettlementClient> = mock.clone();
        fixture_with(mock, client).await
    }

    async fn fixture_with(
        mock: Arc<MockSettlementClient>,
        client: Arc<dyn SettlementClient>,
    ) -> Fixture {
        let (repo, temp) = setup_repo().await;
        let batcher = PayoutBatcher::new(
            repo.clone(),
            client,
            AuditTrail::new(repo.clone()),
            Arc::new(ManualClock::new(TimeMs::new(10_000))),
        );
        Fixture {
            repo,
            batcher,
            mock,
            _temp: temp,
        }
    }

    /// Moves funds through the inner mock, then drops the first response.
    #[derive(Debug)]
    struct LostResponseClient {
        inner: Arc<MockSettlementClient>,
        lose_next: AtomicBool,
    }

    impl LostResponseClient {
        fn wrap(inner: Arc<MockSettlementClient>) -> Arc<dyn SettlementClient> {
            Arc::new(Self {
                inner,
                lose_next: AtomicBool::new(true),
            })
        }
    }

    #[async_trait]
    impl SettlementClient for LostResponseClient {
        async fn submit_batch(
            &self,
            batch_id: &str,
            transfers: &[SettlementTransfer],
        ) -> Result<SettlementReceipt, SettlementError> {
            let receipt = self.inner.submit_batch(batch_id, transfers).await?;
            if self.lose_next.swap(false, Ordering::SeqCst) {
                return Err(SettlementError::NetworkError(
                    "connection reset after send".to_string(),
                ));
            }
            Ok(receipt)
        }

        async fn is_batch_processed(&self, batch_id: &str) -> Result<bool, SettlementError> {
            self.inner.is_batch_processed(batch_id).await
        }

        async fn balance(&self) -> Result<Decimal, SettlementError> {
            self.inner.balance().await
        }
    }

    async fn pending(repo: &Repository, beneficiary: i64, amount: i64) -> CommissionId {
        let mut tx = repo.begin_ledger(TimeMs::new(1)).await.unwrap();
        let id = tx
            .insert_commission(&NewCommission {
                beneficiary_id: MemberId(beneficiary),
                order_id: None,
                source_member_id: None,
                kind: CommissionKind::Direct,
                status: CommissionStatus::Pending,
                amount: Decimal::from(amount),
                order_amount: Decimal::from(amount * 10),
                level: None,
                side: None,
                notes: None,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_group_by_wallet_sums_and_skips_missing_address() {
        let f = fixture().await;
        f.repo.insert_member(&new_member(1, None, None)).await.unwrap();
        f.repo.insert_member(&new_member(2, None, None)).await.unwrap();
        f.repo.set_wallet_address(MemberId(2), None).await.unwrap();

        let a = pending(&f.repo, 1, 10).await;
        let b = pending(&f.repo, 1, 5).await;
        pending(&f.repo, 2, 7).await;

        let loaded = f.batcher.pending_commissions(50, None).await.unwrap();
        let recipients = f.batcher.group_by_wallet(&loaded).await.unwrap();

        assert_eq!(recipients.len(), 1);
        let group = &recipients[&Address::new("0xwallet1".to_string())];
        assert_eq!(group.total_amount, Decimal::from(15));
        assert_eq!(group.commission_ids, vec![a, b]);
    }

    #[tokio::test]
    async fn test_failed_settlement_leaves_commissions_pending() {
        let f = fixture().await;
        f.repo.insert_member(&new_member(1, None, None)).await.unwrap();
        let id = pending(&f.repo, 1, 10).await;
        f.mock
            .fail_next_submission(SettlementError::NetworkError("timeout".to_string()));

        let result = f.batcher.auto_payout(50, None).await;
        assert!(matches!(result, Err(PayoutError::Settlement(_))));

        let commission = f.repo.get_commission(id).await.unwrap().unwrap();
        assert_eq!(commission.status, CommissionStatus::Pending);
        assert_eq!(commission.batch_id, None);
        assert_eq!(
            f.repo.count_audit_action(AuditAction::Failed).await.unwrap(),
            1
        );
        assert!(!f.batcher.is_running());

        // Retrying wholesale succeeds.
        let retry = f.batcher.auto_payout(50, None).await.unwrap();
        assert!(matches!(retry, PayoutOutcome::Settled(_)));
    }

    #[tokio::test]
    async fn test_already_processed_batch_is_reconciled() {
        let f = fixture().await;
        f.repo.insert_member(&new_member(1, None, None)).await.unwrap();
        let id = pending(&f.repo, 1, 10).await;

        let loaded = f.batcher.pending_commissions(50, None).await.unwrap();
        let recipients = f.batcher.group_by_wallet(&loaded).await.unwrap();
        let batch_id = compute_batch_id(&recipients);
        f.mock.mark_processed(&batch_id);

        let receipt = f.batcher.execute_batch(&recipients).await.unwrap();
        assert!(receipt.reconciled);
        assert_eq!(receipt.tx_id, None);
        assert_eq!(receipt.commission_ids, vec![id]);
        assert_eq!(f.mock.submissions(), 0);

        let commission = f.repo.get_commission(id).await.unwrap().unwrap();
        assert_eq!(commission.status, CommissionStatus::Paid);
        assert_eq!(commission.batch_id.as_deref(), Some(batch_id.as_str()));
        assert_eq!(commission.tx_id, None);
    }

    #[tokio::test]
    async fn test_lost_response_is_reconciled_not_paid_twice() {
        let mock = Arc::new(MockSettlementClient::default());
        let f = fixture_with(mock.clone(), LostResponseClient::wrap(mock.clone())).await;
        f.repo.insert_member(&new_member(1, None, None)).await.unwrap();
        let id = pending(&f.repo, 1, 10).await;

        let err = f.batcher.auto_payout(50, None).await.unwrap_err();
        assert!(err.outcome_unknown(), "got {:?}", err);
        let commission = f.repo.get_commission(id).await.unwrap().unwrap();
        assert_eq!(commission.status, CommissionStatus::Pending);
        assert_eq!(mock.submissions(), 1);

        // The next sweep finds the batch on the settlement side.
        assert_eq!(
            f.batcher.auto_payout(50, None).await.unwrap(),
            PayoutOutcome::NothingToPay
        );
        assert_eq!(mock.submissions(), 1);
        assert_eq!(mock.balance().await.unwrap(), Decimal::from(1_000_000 - 10));

        let commission = f.repo.get_commission(id).await.unwrap().unwrap();
        assert_eq!(commission.status, CommissionStatus::Paid);
        let batch_id = commission.batch_id.clone().unwrap();
        let entries = f
            .batcher
            .audit()
            .entries(&AuditFilter {
                batch_id: Some(batch_id),
                ..Default::default()
            })
            .await
            .unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::Created, AuditAction::Failed, AuditAction::Executed]
        );
        assert_eq!(entries[1].metadata["outcomeUnknown"], true);
        assert_eq!(entries[2].metadata["reconciled"], true);
    }

    #[tokio::test]
    async fn test_lost_response_with_new_commissions_pays_each_once() {
        let mock = Arc::new(MockSettlementClient::default());
        let f = fixture_with(mock.clone(), LostResponseClient::wrap(mock.clone())).await;
        f.repo.insert_member(&new_member(1, None, None)).await.unwrap();
        let first = pending(&f.repo, 1, 10).await;
        assert!(f.batcher.auto_payout(50, None).await.is_err());

        // A new commission changes the pending set and so the batch id.
        let second = pending(&f.repo, 1, 7).await;
        let outcome = f.batcher.auto_payout(50, None).await.unwrap();
        let PayoutOutcome::Settled(receipt) = outcome else {
            panic!("expected settled, got {:?}", outcome);
        };
        assert_eq!(receipt.commission_ids, vec![second]);
        assert_eq!(receipt.total_amount, Decimal::from(7));
        assert!(!receipt.reconciled);

        assert_eq!(mock.submissions(), 2);
        assert_eq!(mock.balance().await.unwrap(), Decimal::from(1_000_000 - 17));
        for id in [first, second] {
            let c = f.repo.get_commission(id).await.unwrap().unwrap();
            assert_eq!(c.status, CommissionStatus::Paid);
        }
    }

    #[tokio::test]
    async fn test_unsent_failure_is_not_reconciled() {
        let f = fixture().await;
        f.repo.insert_member(&new_member(1, None, None)).await.unwrap();
        let id = pending(&f.repo, 1, 10).await;
        f.mock
            .fail_next_submission(SettlementError::HttpError {
                status: 503,
                message: "unavailable".to_string(),
            });
        assert!(f.batcher.auto_payout(50, None).await.is_err());

        // Nothing reached settlement, so the retry submits under the same id.
        let outcome = f.batcher.auto_payout(50, None).await.unwrap();
        let PayoutOutcome::Settled(receipt) = outcome else {
            panic!("expected settled, got {:?}", outcome);
        };
        assert!(!receipt.reconciled);
        assert_eq!(receipt.tx_id.as_deref(), Some("0xmock0001"));
        let commission = f.repo.get_commission(id).await.unwrap().unwrap();
        assert_eq!(commission.batch_id.as_deref(), Some(receipt.batch_id.as_str()));
        assert_eq!(f.mock.submissions(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_balance_fails_before_submit() {
        let (repo, _temp) = setup_repo().await;
        let mock = Arc::new(MockSettlementClient::new(Decimal::from(5)));
        let client: Arc<dyn SettlementClient> = mock.clone();
        let batcher = PayoutBatcher::new(
            repo.clone(),
            client,
            AuditTrail::new(repo.clone()),
            Arc::new(ManualClock::new(TimeMs::new(1))),
        );
        repo.insert_member(&new_member(1, None, None)).await.unwrap();
        pending(&repo, 1, 10).await;

        let result = batcher.auto_payout(10, None).await;
        assert!(matches!(
            result,
            Err(PayoutError::InsufficientBalance { .. })
        ));
        assert_eq!(mock.submissions(), 0);
    }

    #[tokio::test]
    async fn test_busy_while_running() {
        let f = fixture().await;
        let guard = f.batcher.try_begin();
        assert!(guard.is_some());
        assert_eq!(
            f.batcher.auto_payout(10, None).await.unwrap(),
            PayoutOutcome::Busy
        );
        drop(guard);
        assert_eq!(
            f.batcher.auto_payout(10, None).await.unwrap(),
            PayoutOutcome::NothingToPay
        );
    }

    #[tokio::test]
    async fn test_approve_writes_admin_audit() {
        let f = fixture().await;
        f.repo.insert_member(&new_member(1, None, None)).await.unwrap();
        let id = pending(&f.repo, 1, 10).await;

        let approved = f.batcher.approve(id).await.unwrap().unwrap();
        assert_eq!(approved.status, CommissionStatus::Paid);
        assert!(f.batcher.approve(id).await.unwrap().is_none());
        assert_eq!(
            f.repo
                .count_audit_action(AuditAction::AdminApproval)
                .await
                .unwrap(),
            1
        );
    }
}
