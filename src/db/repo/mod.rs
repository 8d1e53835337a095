//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for pool-level operations and
//! `LedgerTx` for multi-statement writes that must commit together.
//! Methods are organized across submodules by domain:
//! - `commissions.rs` - Commission reads, manual approval, payout statistics
//! - `configs.rs` - Tier config rows and milestone awards
//! - `audit.rs` - Append-only audit log
//! - `ledger.rs` - Transactional money updates for orders, milestones and batches

mod audit;
mod commissions;
mod configs;
mod ledger;

pub use commissions::StatusTotals;
pub use ledger::LedgerTx;

use crate::domain::{
    Address, Commission, CommissionId, Decimal, LegSide, Member, MemberId, NewMember, Order,
    OrderId, OrderStatus, Tier, TimeMs,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

pub(crate) const MEMBER_COLUMNS: &str = r#"
    id, parent_id, position, referrer_id, tier, wallet_address,
    total_purchase_amount, total_commission_received, total_reconsumption_amount,
    left_subtree_volume, right_subtree_volume, created_at
"#;

pub(crate) const COMMISSION_COLUMNS: &str = r#"
    id, beneficiary_id, order_id, source_member_id, kind, status, amount, order_amount,
    level, side, notes, batch_id, tx_id, settled_at, created_at
"#;

/// Convert a money amount to the minor units stored in SQLite.
pub(crate) fn minor_units(amount: Decimal) -> Result<i64, sqlx::Error> {
    amount
        .to_minor_units()
        .ok_or_else(|| sqlx::Error::Protocol(format!("amount out of range: {}", amount)))
}

fn decode_err<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

pub(crate) fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(decode_err)
}

pub(crate) fn parse_optional_column<T>(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| s.parse::<T>().map_err(decode_err)).transpose()
}

/// Parse a decimal rate column, falling back to zero on malformed data.
pub(crate) fn rate_column(row: &SqliteRow, column: &str) -> Decimal {
    let raw: String = row.get(column);
    Decimal::from_str(&raw).unwrap_or_else(|e| {
        warn!(
            column = column,
            value = %raw,
            error = %e,
            "Failed to parse rate decimal, using zero"
        );
        Decimal::zero()
    })
}

pub(crate) fn money_column(row: &SqliteRow, column: &str) -> Decimal {
    Decimal::from_minor_units(row.get::<i64, _>(column))
}

pub(crate) fn member_from_row(row: &SqliteRow) -> Result<Member, sqlx::Error> {
    Ok(Member {
        id: MemberId(row.get("id")),
        parent_id: row.get::<Option<i64>, _>("parent_id").map(MemberId),
        position: parse_optional_column::<LegSide>(row, "position")?,
        referrer_id: row.get::<Option<i64>, _>("referrer_id").map(MemberId),
        tier: parse_column::<Tier>(row, "tier")?,
        wallet_address: row
            .get::<Option<String>, _>("wallet_address")
            .filter(|s| !s.trim().is_empty())
            .map(Address::new),
        total_purchase_amount: money_column(row, "total_purchase_amount"),
        total_commission_received: money_column(row, "total_commission_received"),
        total_reconsumption_amount: money_column(row, "total_reconsumption_amount"),
        left_subtree_volume: money_column(row, "left_subtree_volume"),
        right_subtree_volume: money_column(row, "right_subtree_volume"),
        created_at: TimeMs::new(row.get("created_at")),
    })
}

pub(crate) fn order_from_row(row: &SqliteRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        id: OrderId(row.get("id")),
        buyer_id: MemberId(row.get("buyer_id")),
        amount: money_column(row, "amount"),
        status: parse_column::<OrderStatus>(row, "status")?,
        created_at: TimeMs::new(row.get("created_at")),
    })
}

pub(crate) fn commission_from_row(row: &SqliteRow) -> Result<Commission, sqlx::Error> {
    Ok(Commission {
        id: CommissionId(row.get("id")),
        beneficiary_id: MemberId(row.get("beneficiary_id")),
        order_id: row.get::<Option<i64>, _>("order_id").map(OrderId),
        source_member_id: row.get::<Option<i64>, _>("source_member_id").map(MemberId),
        kind: parse_column(row, "kind")?,
        status: parse_column(row, "status")?,
        amount: money_column(row, "amount"),
        order_amount: money_column(row, "order_amount"),
        level: row
            .get::<Option<i64>, _>("level")
            .and_then(|l| u8::try_from(l).ok()),
        side: parse_optional_column::<LegSide>(row, "side")?,
        notes: row.get("notes"),
        batch_id: row.get("batch_id"),
        tx_id: row.get("tx_id"),
        settled_at: row.get::<Option<i64>, _>("settled_at").map(TimeMs::new),
        created_at: TimeMs::new(row.get("created_at")),
    })
}

/// Repository for database operations.
#[derive(Debug)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Underlying pool, for callers that need ad-hoc queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a write transaction for a group of ledger updates.
    pub async fn begin_ledger(&self, now: TimeMs) -> Result<LedgerTx, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(LedgerTx::new(tx, now))
    }

    // =========================================================================
    // Member operations
    // =========================================================================

    /// Register a member idempotently.
    ///
    /// Returns false when the member already exists. Placing a second child on
    /// an occupied leg fails with a unique-constraint error.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_member(&self, member: &NewMember) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO members (id, parent_id, position, referrer_id, tier, wallet_address, created_at)
            VALUES (?, ?, ?, ?, 'none', ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(member.id.as_i64())
        .bind(member.parent_id.map(|p| p.as_i64()))
        .bind(member.position.map(|p| p.as_str()))
        .bind(member.referrer_id.map(|r| r.as_i64()))
        .bind(member.wallet_address.as_ref().map(|a| a.as_str()))
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_member(&self, id: MemberId) -> Result<Option<Member>, sqlx::Error> {
        let sql = format!("SELECT {} FROM members WHERE id = ?", MEMBER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    /// Direct child of `parent` on `side`, if any.
    pub async fn child_at(
        &self,
        parent: MemberId,
        side: LegSide,
    ) -> Result<Option<MemberId>, sqlx::Error> {
        let row = sqlx::query("SELECT id FROM members WHERE parent_id = ? AND position = ?")
            .bind(parent.as_i64())
            .bind(side.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| MemberId(r.get("id"))))
    }

    /// Overwrite a member's tier. Used for admin corrections and seeding.
    pub async fn set_member_tier(&self, id: MemberId, tier: Tier) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE members SET tier = ? WHERE id = ?")
            .bind(tier.as_str())
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_wallet_address(
        &self,
        id: MemberId,
        wallet: Option<&Address>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE members SET wallet_address = ? WHERE id = ?")
            .bind(wallet.map(|a| a.as_str()))
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Settlement address for a member, if one is on file.
    pub async fn get_payout_address(&self, id: MemberId) -> Result<Option<Address>, sqlx::Error> {
        let row = sqlx::query("SELECT wallet_address FROM members WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .and_then(|r| r.get::<Option<String>, _>("wallet_address"))
            .filter(|s| !s.trim().is_empty())
            .map(Address::new))
    }

    /// Number of members referred by `referrer` that currently hold a tier.
    pub async fn count_active_referrals(&self, referrer: MemberId) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM members WHERE referrer_id = ? AND tier != 'none'",
        )
        .bind(referrer.as_i64())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("cnt"))
    }

    // =========================================================================
    // Order operations
    // =========================================================================

    /// Record an order idempotently. Returns false if the id already exists.
    pub async fn insert_order(
        &self,
        id: OrderId,
        buyer_id: MemberId,
        amount: Decimal,
        status: OrderStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, buyer_id, amount, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id.as_i64())
        .bind(buyer_id.as_i64())
        .bind(minor_units(amount)?)
        .bind(status.as_str())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, buyer_id, amount, status, created_at FROM orders WHERE id = ?",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    pub async fn set_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::migrations::init_db;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub async fn setup_repo() -> (Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Arc::new(Repository::new(pool)), temp_dir)
    }

    pub fn new_member(id: i64, parent: Option<(i64, LegSide)>, referrer: Option<i64>) -> NewMember {
        NewMember {
            id: MemberId(id),
            parent_id: parent.map(|(p, _)| MemberId(p)),
            position: parent.map(|(_, s)| s),
            referrer_id: referrer.map(MemberId),
            wallet_address: Some(Address::new(format!("0xwallet{}", id))),
        }
    }
}
