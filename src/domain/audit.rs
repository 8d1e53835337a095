//! Append-only audit log entries.

use super::{ParseEnumError, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Executed,
    Failed,
    AdminApproval,
    ConfigUpdated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Executed => "executed",
            AuditAction::Failed => "failed",
            AuditAction::AdminApproval => "admin_approval",
            AuditAction::ConfigUpdated => "config_updated",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(AuditAction::Created),
            "executed" => Ok(AuditAction::Executed),
            "failed" => Ok(AuditAction::Failed),
            "admin_approval" => Ok(AuditAction::AdminApproval),
            "config_updated" => Ok(AuditAction::ConfigUpdated),
            other => Err(ParseEnumError::new("audit action", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub batch_id: Option<String>,
    pub action: AuditAction,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: TimeMs,
}

/// Filter for reading the audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub batch_id: Option<String>,
    pub from_ms: Option<TimeMs>,
    pub to_ms: Option<TimeMs>,
}
