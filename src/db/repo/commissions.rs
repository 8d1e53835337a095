//! Commission reads, manual approval and payout statistics.

use super::{commission_from_row, minor_units, Repository, COMMISSION_COLUMNS};
use crate::domain::{
    Commission, CommissionId, CommissionStatus, Decimal, MemberId, OrderId, TimeMs,
};
use serde::Serialize;
use sqlx::Row;

/// Row count and amount sum for one commission status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTotals {
    pub status: CommissionStatus,
    pub count: i64,
    pub total_amount: Decimal,
}

impl Repository {
    /// Pending commissions, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn pending_commissions(
        &self,
        limit: i64,
        min_amount: Option<Decimal>,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let min_units = match min_amount {
            Some(min) => minor_units(min)?,
            None => 0,
        };
        let sql = format!(
            r#"
            SELECT {}
            FROM commissions
            WHERE status = 'pending' AND amount >= ?
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(min_units)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(commission_from_row).collect()
    }

    /// Pending commissions generated by one order, oldest first.
    pub async fn pending_commissions_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commissions WHERE order_id = ? AND status = 'pending' ORDER BY created_at ASC, id ASC",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(commission_from_row).collect()
    }

    pub async fn commissions_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commissions WHERE order_id = ? ORDER BY id ASC",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(commission_from_row).collect()
    }

    pub async fn commissions_for_beneficiary(
        &self,
        member: MemberId,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commissions WHERE beneficiary_id = ? ORDER BY id ASC",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(member.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(commission_from_row).collect()
    }

    pub async fn get_commission(
        &self,
        id: CommissionId,
    ) -> Result<Option<Commission>, sqlx::Error> {
        let sql = format!("SELECT {} FROM commissions WHERE id = ?", COMMISSION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(commission_from_row).transpose()
    }

    /// Load the given commissions that are still pending, in id order.
    pub async fn pending_commissions_by_ids(
        &self,
        ids: &[CommissionId],
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let mut out = Vec::with_capacity(ids.len());
        let mut sorted: Vec<CommissionId> = ids.to_vec();
        sorted.sort();
        sorted.dedup();
        for id in sorted {
            if let Some(c) = self.get_commission(id).await? {
                if c.status == CommissionStatus::Pending {
                    out.push(c);
                }
            }
        }
        Ok(out)
    }

    /// Mark a pending or blocked commission paid without settlement.
    ///
    /// Returns the updated row, or None when the commission does not exist or
    /// is already paid.
    pub async fn approve_commission(
        &self,
        id: CommissionId,
        note: &str,
    ) -> Result<Option<Commission>, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE commissions
            SET status = 'paid',
                settled_at = ?,
                notes = CASE WHEN notes IS NULL OR notes = '' THEN ? ELSE notes || '; ' || ? END
            WHERE id = ? AND status IN ('pending', 'blocked')
            "#,
        )
        .bind(TimeMs::now().as_ms())
        .bind(note)
        .bind(note)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_commission(id).await
    }

    /// Row counts and amount sums per status.
    pub async fn commission_totals(&self) -> Result<Vec<StatusTotals>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS cnt, COALESCE(SUM(amount), 0) AS total
            FROM commissions
            GROUP BY status
            ORDER BY status ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut totals = Vec::with_capacity(rows.len());
        for row in &rows {
            totals.push(StatusTotals {
                status: super::parse_column(row, "status")?,
                count: row.get("cnt"),
                total_amount: Decimal::from_minor_units(row.get("total")),
            });
        }
        Ok(totals)
    }
}
