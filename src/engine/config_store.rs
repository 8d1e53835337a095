//! TTL cache over the per-tier commission config.

use super::Clock;
use crate::db::Repository;
use crate::domain::{Tier, TierConfig, TimeMs};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedConfig {
    config: TierConfig,
    loaded_at: TimeMs,
}

/// Per-tier config with load-on-miss and explicit invalidation.
///
/// Tiers without a stored row resolve to `TierConfig::default_for`, so the
/// calculator keeps working before an admin configures anything.
pub struct ConfigStore {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
    cache: RwLock<HashMap<Tier, CachedConfig>>,
}

impl ConfigStore {
    pub fn new(repo: Arc<Repository>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            repo,
            clock,
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Config for `tier`. `Tier::None` always yields the all-zero config.
    ///
    /// # Errors
    /// Returns an error if loading from the database fails.
    pub async fn get(&self, tier: Tier) -> Result<TierConfig, sqlx::Error> {
        if !tier.is_active() {
            return Ok(TierConfig::default_for(Tier::None));
        }

        let now = self.clock.now();
        if let Some(hit) = self.cached(tier, now) {
            return Ok(hit);
        }

        let config = match self.repo.get_tier_config(tier).await? {
            Some(stored) => stored,
            None => {
                debug!(tier = %tier, "No stored commission config, using defaults");
                TierConfig::default_for(tier)
            }
        };

        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                tier,
                CachedConfig {
                    config: config.clone(),
                    loaded_at: now,
                },
            );
        Ok(config)
    }

    /// Configs for every paid tier, lowest tier first.
    pub async fn all(&self) -> Result<Vec<TierConfig>, sqlx::Error> {
        let mut configs = Vec::with_capacity(Tier::PAID.len());
        for tier in Tier::PAID {
            configs.push(self.get(tier).await?);
        }
        Ok(configs)
    }

    /// Resolve every tier's config at once.
    ///
    /// Ledger transactions take a snapshot before they open: a cache miss
    /// inside one would need a second pool connection while the write lock
    /// is held.
    pub async fn snapshot(&self) -> Result<TierConfigs, sqlx::Error> {
        Ok(TierConfigs {
            paid: self.all().await?,
            none: TierConfig::default_for(Tier::None),
        })
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        debug!("Commission config cache invalidated");
    }

    /// Persist an admin update and invalidate the cache.
    pub async fn update(&self, config: &TierConfig) -> Result<(), sqlx::Error> {
        self.repo.upsert_tier_config(config).await?;
        self.invalidate();
        Ok(())
    }

    fn cached(&self, tier: Tier, now: TimeMs) -> Option<TierConfig> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache
            .get(&tier)
            .filter(|c| now.as_ms().saturating_sub(c.loaded_at.as_ms()) < self.ttl_ms)
            .map(|c| c.config.clone())
    }
}

/// Point-in-time configs for every tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierConfigs {
    paid: Vec<TierConfig>,
    none: TierConfig,
}

impl TierConfigs {
    /// Config for `tier`; `Tier::None` resolves to the all-zero config.
    pub fn get(&self, tier: Tier) -> &TierConfig {
        self.paid
            .iter()
            .find(|c| c.tier == tier)
            .unwrap_or(&self.none)
    }

    /// Paid tier configs, lowest tier first.
    pub fn paid(&self) -> &[TierConfig] {
        &self.paid
    }
}
