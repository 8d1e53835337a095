//! Append-only audit log.

use super::{parse_column, Repository};
use crate::domain::{AuditAction, AuditEntry, AuditFilter, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

impl Repository {
    /// Append an audit entry and return its id.
    pub async fn insert_audit(
        &self,
        batch_id: Option<&str>,
        action: AuditAction,
        description: &str,
        metadata: &serde_json::Value,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_log (batch_id, action, description, metadata, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch_id)
        .bind(action.as_str())
        .bind(description)
        .bind(metadata.to_string())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Audit entries matching the filter, oldest first.
    pub async fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let from_ms = filter.from_ms.unwrap_or(TimeMs::new(0)).as_ms();
        let to_ms = filter.to_ms.unwrap_or(TimeMs::new(i64::MAX)).as_ms();

        let (sql, binds_batch) = if filter.batch_id.is_some() {
            (
                r#"
                SELECT id, batch_id, action, description, metadata, created_at
                FROM audit_log
                WHERE batch_id = ? AND created_at >= ? AND created_at <= ?
                ORDER BY created_at ASC, id ASC
                "#,
                true,
            )
        } else {
            (
                r#"
                SELECT id, batch_id, action, description, metadata, created_at
                FROM audit_log
                WHERE created_at >= ? AND created_at <= ?
                ORDER BY created_at ASC, id ASC
                "#,
                false,
            )
        };

        let mut query = sqlx::query(sql);
        if binds_batch {
            query = query.bind(filter.batch_id.as_deref());
        }
        query = query.bind(from_ms).bind(to_ms);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(audit_from_row).collect()
    }

    /// Latest entries with `action`, newest first.
    pub async fn recent_audit(
        &self,
        action: AuditAction,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, batch_id, action, description, metadata, created_at
            FROM audit_log
            WHERE action = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(action.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(audit_from_row).collect()
    }

    /// Number of audit entries with the given action.
    pub async fn count_audit_action(&self, action: AuditAction) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM audit_log WHERE action = ?")
            .bind(action.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("cnt"))
    }
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditEntry, sqlx::Error> {
    let id: i64 = row.get("id");
    let raw: String = row.get("metadata");
    let metadata = serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(audit_id = id, error = %e, "Failed to parse audit metadata");
        serde_json::Value::String(raw.clone())
    });
    Ok(AuditEntry {
        id,
        batch_id: row.get("batch_id"),
        action: parse_column::<AuditAction>(row, "action")?,
        description: row.get("description"),
        metadata,
        created_at: TimeMs::new(row.get("created_at")),
    })
}
