//! Tier config rows and milestone awards.

use super::{minor_units, money_column, parse_column, rate_column, Repository};
use crate::domain::{CommissionId, MemberId, Tier, TierConfig, TimeMs, UserMilestone};
use sqlx::Row;

impl Repository {
    /// Stored config for a tier, or None when no admin row exists yet.
    pub async fn get_tier_config(&self, tier: Tier) -> Result<Option<TierConfig>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT tier, direct_rate, group_rate, management_rate_f1, management_rate_f2,
                   management_rate_f3, package_value, reconsumption_threshold,
                   reconsumption_required
            FROM commission_configs
            WHERE tier = ?
            "#,
        )
        .bind(tier.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(TierConfig {
                tier: parse_column(&r, "tier")?,
                direct_rate: rate_column(&r, "direct_rate"),
                group_rate: rate_column(&r, "group_rate"),
                management_rate_f1: rate_column(&r, "management_rate_f1"),
                management_rate_f2: rate_column(&r, "management_rate_f2"),
                management_rate_f3: rate_column(&r, "management_rate_f3"),
                package_value: money_column(&r, "package_value"),
                reconsumption_threshold: money_column(&r, "reconsumption_threshold"),
                reconsumption_required: money_column(&r, "reconsumption_required"),
            })
        })
        .transpose()
    }

    /// Insert or replace the config row for `config.tier`.
    ///
    /// Callers must invalidate the config cache afterwards; `ConfigStore::update`
    /// does both.
    pub async fn upsert_tier_config(&self, config: &TierConfig) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO commission_configs (
                tier, direct_rate, group_rate, management_rate_f1, management_rate_f2,
                management_rate_f3, package_value, reconsumption_threshold,
                reconsumption_required, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tier) DO UPDATE SET
                direct_rate = excluded.direct_rate,
                group_rate = excluded.group_rate,
                management_rate_f1 = excluded.management_rate_f1,
                management_rate_f2 = excluded.management_rate_f2,
                management_rate_f3 = excluded.management_rate_f3,
                package_value = excluded.package_value,
                reconsumption_threshold = excluded.reconsumption_threshold,
                reconsumption_required = excluded.reconsumption_required,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(config.tier.as_str())
        .bind(config.direct_rate.to_canonical_string())
        .bind(config.group_rate.to_canonical_string())
        .bind(config.management_rate_f1.to_canonical_string())
        .bind(config.management_rate_f2.to_canonical_string())
        .bind(config.management_rate_f3.to_canonical_string())
        .bind(minor_units(config.package_value)?)
        .bind(minor_units(config.reconsumption_threshold)?)
        .bind(minor_units(config.reconsumption_required)?)
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_milestones(&self, member: MemberId) -> Result<Vec<UserMilestone>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT member_id, milestone_count, reward_amount, reward_kind, status,
                   commission_id, created_at
            FROM user_milestones
            WHERE member_id = ?
            ORDER BY milestone_count ASC
            "#,
        )
        .bind(member.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            out.push(UserMilestone {
                member_id: MemberId(r.get("member_id")),
                milestone_count: r.get("milestone_count"),
                reward_amount: money_column(r, "reward_amount"),
                reward_kind: parse_column(r, "reward_kind")?,
                status: parse_column(r, "status")?,
                commission_id: r.get::<Option<i64>, _>("commission_id").map(CommissionId),
                created_at: TimeMs::new(r.get("created_at")),
            });
        }
        Ok(out)
    }
}
