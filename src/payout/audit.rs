//! Append-only audit trail for settlement and admin actions.

use crate::db::Repository;
use crate::domain::{AuditAction, AuditEntry, AuditFilter, TimeMs};
use chrono::TimeZone;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct AuditTrail {
    repo: Arc<Repository>,
}

impl AuditTrail {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Append an entry. A failed write is logged and swallowed so it never
    /// aborts the operation being audited.
    pub async fn record(
        &self,
        batch_id: Option<&str>,
        action: AuditAction,
        description: &str,
        metadata: serde_json::Value,
    ) -> Option<i64> {
        match self
            .repo
            .insert_audit(batch_id, action, description, &metadata)
            .await
        {
            Ok(id) => {
                debug!(audit_id = id, action = action.as_str(), batch_id = ?batch_id, "Audit entry recorded");
                Some(id)
            }
            Err(e) => {
                error!(
                    action = action.as_str(),
                    batch_id = ?batch_id,
                    error = %e,
                    "Failed to write audit entry"
                );
                None
            }
        }
    }

    pub async fn entries(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, sqlx::Error> {
        self.repo.query_audit(filter).await
    }
}

/// Render entries as CSV with a header row.
pub fn to_csv(entries: &[AuditEntry]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "id",
        "batch_id",
        "action",
        "description",
        "metadata",
        "created_at",
        "created_at_utc",
    ])?;
    for entry in entries {
        writer.write_record([
            entry.id.to_string(),
            entry.batch_id.clone().unwrap_or_default(),
            entry.action.as_str().to_string(),
            entry.description.clone(),
            entry.metadata.to_string(),
            entry.created_at.as_ms().to_string(),
            utc_timestamp(entry.created_at),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn utc_timestamp(at: TimeMs) -> String {
    chrono::Utc
        .timestamp_millis_opt(at.as_ms())
        .single()
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}
