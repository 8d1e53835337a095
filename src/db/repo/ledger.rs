//! Transactional ledger writes.
//!
//! SQLite takes the write lock at a transaction's first write, so every flow
//! that uses `LedgerTx` issues a write first (order claim, milestone insert,
//! batch reservation) to avoid upgrading a stale read snapshot.

use super::{
    commission_from_row, member_from_row, minor_units, order_from_row, COMMISSION_COLUMNS,
    MEMBER_COLUMNS,
};
use crate::domain::{
    Commission, CommissionId, CommissionKind, CommissionStatus, Decimal, LegSide, Member,
    MemberId, MilestoneBucket, NewCommission, Order, OrderId, Tier, TimeMs,
};
use sqlx::sqlite::Sqlite;
use sqlx::{Row, Transaction};

/// An open write transaction over the commission ledger.
///
/// Counter updates are always `SET x = x + ?` so concurrent orders touching
/// the same ancestor never lose an increment. Dropping without `commit`
/// rolls back.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
    now: TimeMs,
}

impl LedgerTx {
    pub(super) fn new(tx: Transaction<'static, Sqlite>, now: TimeMs) -> Self {
        Self { tx, now }
    }

    pub fn now(&self) -> TimeMs {
        self.now
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }

    // =========================================================================
    // Order computation
    // =========================================================================

    /// Claim an order for commission computation. Returns false if it was
    /// already claimed by a committed computation.
    pub async fn claim_order(&mut self, order_id: OrderId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_orders (order_id, processed_at)
            VALUES (?, ?)
            ON CONFLICT(order_id) DO NOTHING
            "#,
        )
        .bind(order_id.as_i64())
        .bind(self.now.as_ms())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn order_has_commissions(&mut self, order_id: OrderId) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM commissions WHERE order_id = ?")
            .bind(order_id.as_i64())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.get::<i64, _>("cnt") > 0)
    }

    pub async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, buyer_id, amount, status, created_at FROM orders WHERE id = ?",
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    pub async fn get_member(&mut self, id: MemberId) -> Result<Option<Member>, sqlx::Error> {
        let sql = format!("SELECT {} FROM members WHERE id = ?", MEMBER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    /// Direct child of `parent` on `side`, if any.
    pub async fn child_at(
        &mut self,
        parent: MemberId,
        side: LegSide,
    ) -> Result<Option<MemberId>, sqlx::Error> {
        let row = sqlx::query("SELECT id FROM members WHERE parent_id = ? AND position = ?")
            .bind(parent.as_i64())
            .bind(side.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|r| MemberId(r.get("id"))))
    }

    pub async fn add_purchase(&mut self, id: MemberId, amount: Decimal) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE members SET total_purchase_amount = total_purchase_amount + ? WHERE id = ?",
        )
        .bind(minor_units(amount)?)
        .bind(id.as_i64())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn add_reconsumption(
        &mut self,
        id: MemberId,
        amount: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE members SET total_reconsumption_amount = total_reconsumption_amount + ? WHERE id = ?",
        )
        .bind(minor_units(amount)?)
        .bind(id.as_i64())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn set_tier(&mut self, id: MemberId, tier: Tier) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE members SET tier = ? WHERE id = ?")
            .bind(tier.as_str())
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Atomically add to a member's received commission and return the new total.
    pub async fn add_commission_received(
        &mut self,
        id: MemberId,
        amount: Decimal,
    ) -> Result<Decimal, sqlx::Error> {
        sqlx::query(
            "UPDATE members SET total_commission_received = total_commission_received + ? WHERE id = ?",
        )
        .bind(minor_units(amount)?)
        .bind(id.as_i64())
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query("SELECT total_commission_received FROM members WHERE id = ?")
            .bind(id.as_i64())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(Decimal::from_minor_units(row.get("total_commission_received")))
    }

    pub async fn add_leg_volume(
        &mut self,
        id: MemberId,
        side: LegSide,
        amount: Decimal,
    ) -> Result<(), sqlx::Error> {
        let sql = match side {
            LegSide::Left => {
                "UPDATE members SET left_subtree_volume = left_subtree_volume + ? WHERE id = ?"
            }
            LegSide::Right => {
                "UPDATE members SET right_subtree_volume = right_subtree_volume + ? WHERE id = ?"
            }
        };
        sqlx::query(sql)
            .bind(minor_units(amount)?)
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn insert_commission(
        &mut self,
        commission: &NewCommission,
    ) -> Result<CommissionId, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO commissions (
                beneficiary_id, order_id, source_member_id, kind, status, amount,
                order_amount, level, side, notes, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(commission.beneficiary_id.as_i64())
        .bind(commission.order_id.map(|o| o.as_i64()))
        .bind(commission.source_member_id.map(|m| m.as_i64()))
        .bind(commission.kind.as_str())
        .bind(commission.status.as_str())
        .bind(minor_units(commission.amount)?)
        .bind(minor_units(commission.order_amount)?)
        .bind(commission.level.map(i64::from))
        .bind(commission.side.map(|s| s.as_str()))
        .bind(commission.notes.as_deref())
        .bind(self.now.as_ms())
        .execute(&mut *self.tx)
        .await?;
        Ok(CommissionId(result.last_insert_rowid()))
    }

    /// Pending commissions of the given kinds created for one order.
    pub async fn pending_commissions_of_kind(
        &mut self,
        order_id: OrderId,
        kinds: &[CommissionKind],
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commissions WHERE order_id = ? AND status = 'pending' ORDER BY id ASC",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_i64())
            .fetch_all(&mut *self.tx)
            .await?;
        let mut out = Vec::new();
        for row in &rows {
            let commission = commission_from_row(row)?;
            if kinds.contains(&commission.kind) {
                out.push(commission);
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Milestones
    // =========================================================================

    /// Tiered members referred by `referrer`, counting this transaction's
    /// own tier changes.
    pub async fn count_active_referrals(&mut self, referrer: MemberId) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM members WHERE referrer_id = ? AND tier != 'none'",
        )
        .bind(referrer.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.get("cnt"))
    }

    /// Insert a milestone award. Returns false if `(member, count)` was
    /// already awarded.
    pub async fn insert_milestone(
        &mut self,
        member_id: MemberId,
        milestone_count: i64,
        reward_amount: Decimal,
        bucket: MilestoneBucket,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_milestones (
                member_id, milestone_count, reward_amount, reward_kind, status, created_at
            ) VALUES (?, ?, ?, ?, 'pending', ?)
            ON CONFLICT(member_id, milestone_count) DO NOTHING
            "#,
        )
        .bind(member_id.as_i64())
        .bind(milestone_count)
        .bind(minor_units(reward_amount)?)
        .bind(bucket.as_str())
        .bind(self.now.as_ms())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn link_milestone_commission(
        &mut self,
        member_id: MemberId,
        milestone_count: i64,
        commission_id: CommissionId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE user_milestones SET commission_id = ? WHERE member_id = ? AND milestone_count = ?",
        )
        .bind(commission_id.as_i64())
        .bind(member_id.as_i64())
        .bind(milestone_count)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Settlement batches
    // =========================================================================

    /// Tag still-pending commissions with `batch_id`. Returns how many were tagged.
    pub async fn reserve_for_batch(
        &mut self,
        batch_id: &str,
        ids: &[CommissionId],
    ) -> Result<u64, sqlx::Error> {
        let mut reserved = 0u64;
        for id in ids {
            let result = sqlx::query(
                "UPDATE commissions SET batch_id = ? WHERE id = ? AND status = 'pending'",
            )
            .bind(batch_id)
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;
            reserved += result.rows_affected();
        }
        Ok(reserved)
    }

    /// Mark every reserved commission of a batch paid. Returns rows updated.
    ///
    /// `tx_id` is None when the batch was found already settled and no
    /// receipt is available.
    pub async fn mark_batch_paid(
        &mut self,
        batch_id: &str,
        tx_id: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE commissions
            SET status = ?, tx_id = ?, settled_at = ?
            WHERE batch_id = ? AND status = 'pending'
            "#,
        )
        .bind(CommissionStatus::Paid.as_str())
        .bind(tx_id)
        .bind(self.now.as_ms())
        .bind(batch_id)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE user_milestones SET status = 'paid'
            WHERE commission_id IN (SELECT id FROM commissions WHERE batch_id = ? AND status = 'paid')
            "#,
        )
        .bind(batch_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }
}
