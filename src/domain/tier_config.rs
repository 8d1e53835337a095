//! Per-tier commission rates and thresholds.

use super::{Decimal, Tier};
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};

/// Deepest management generation ever paid.
pub const MAX_MANAGEMENT_LEVEL: u8 = 3;

/// Commission configuration for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierConfig {
    pub tier: Tier,
    pub direct_rate: Decimal,
    pub group_rate: Decimal,
    pub management_rate_f1: Decimal,
    pub management_rate_f2: Decimal,
    pub management_rate_f3: Decimal,
    /// Purchase amount required to hold this tier.
    pub package_value: Decimal,
    pub reconsumption_threshold: Decimal,
    pub reconsumption_required: Decimal,
}

fn rate(mantissa: i64, scale: u32) -> Decimal {
    Decimal::new(RustDecimal::new(mantissa, scale))
}

impl TierConfig {
    /// Built-in defaults used until an admin stores a row for the tier.
    pub fn default_for(tier: Tier) -> Self {
        match tier {
            Tier::None => Self {
                tier,
                direct_rate: Decimal::zero(),
                group_rate: Decimal::zero(),
                management_rate_f1: Decimal::zero(),
                management_rate_f2: Decimal::zero(),
                management_rate_f3: Decimal::zero(),
                package_value: Decimal::zero(),
                reconsumption_threshold: Decimal::zero(),
                reconsumption_required: Decimal::zero(),
            },
            Tier::Tier1 => Self {
                tier,
                direct_rate: rate(10, 2),
                group_rate: rate(5, 2),
                management_rate_f1: rate(5, 2),
                management_rate_f2: Decimal::zero(),
                management_rate_f3: Decimal::zero(),
                package_value: Decimal::from(100),
                reconsumption_threshold: Decimal::from(300),
                reconsumption_required: Decimal::from(100),
            },
            Tier::Tier2 => Self {
                tier,
                direct_rate: rate(15, 2),
                group_rate: rate(10, 2),
                management_rate_f1: rate(10, 2),
                management_rate_f2: rate(5, 2),
                management_rate_f3: rate(3, 2),
                package_value: Decimal::from(500),
                reconsumption_threshold: Decimal::from(1500),
                reconsumption_required: Decimal::from(500),
            },
        }
    }

    /// Management rate for generation `level` (1..=3); zero outside that range.
    pub fn management_rate(&self, level: u8) -> Decimal {
        match level {
            1 => self.management_rate_f1,
            2 => self.management_rate_f2,
            3 => self.management_rate_f3,
            _ => Decimal::zero(),
        }
    }

    /// Check rates are within [0, 1] and amounts are non-negative.
    pub fn validate(&self) -> Result<(), String> {
        let rates = [
            ("directRate", self.direct_rate),
            ("groupRate", self.group_rate),
            ("managementRateF1", self.management_rate_f1),
            ("managementRateF2", self.management_rate_f2),
            ("managementRateF3", self.management_rate_f3),
        ];
        for (name, value) in rates {
            if value.is_negative() || value > Decimal::one() {
                return Err(format!("{} must be between 0 and 1, got {}", name, value));
            }
        }
        let amounts = [
            ("packageValue", self.package_value),
            ("reconsumptionThreshold", self.reconsumption_threshold),
            ("reconsumptionRequired", self.reconsumption_required),
        ];
        for (name, value) in amounts {
            if value.is_negative() {
                return Err(format!("{} must not be negative, got {}", name, value));
            }
        }
        if self.tier == Tier::None {
            return Err("tier none has no commission config".to_string());
        }
        Ok(())
    }
}

/// How many generations above a commission recipient earn management income.
pub fn management_generations(recipient_tier: Tier) -> u8 {
    match recipient_tier {
        Tier::None => 0,
        Tier::Tier1 => 1,
        Tier::Tier2 => MAX_MANAGEMENT_LEVEL,
    }
}

/// Highest tier whose package value is covered by `basis`.
pub fn qualifying_tier(basis: Decimal, configs: &[TierConfig]) -> Tier {
    configs
        .iter()
        .filter(|c| c.tier.is_active() && basis >= c.package_value)
        .map(|c| c.tier)
        .max()
        .unwrap_or(Tier::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<TierConfig> {
        Tier::PAID.iter().map(|t| TierConfig::default_for(*t)).collect()
    }

    #[test]
    fn test_qualifying_tier_highest_wins() {
        let configs = defaults();
        assert_eq!(qualifying_tier(Decimal::from(50), &configs), Tier::None);
        assert_eq!(qualifying_tier(Decimal::from(100), &configs), Tier::Tier1);
        assert_eq!(qualifying_tier(Decimal::from(499), &configs), Tier::Tier1);
        assert_eq!(qualifying_tier(Decimal::from(500), &configs), Tier::Tier2);
    }

    #[test]
    fn test_management_rate_levels() {
        let cfg = TierConfig::default_for(Tier::Tier2);
        assert_eq!(cfg.management_rate(1), cfg.management_rate_f1);
        assert_eq!(cfg.management_rate(3), cfg.management_rate_f3);
        assert_eq!(cfg.management_rate(4), Decimal::zero());
        assert_eq!(cfg.management_rate(0), Decimal::zero());
    }

    #[test]
    fn test_management_generations_by_tier() {
        assert_eq!(management_generations(Tier::None), 0);
        assert_eq!(management_generations(Tier::Tier1), 1);
        assert_eq!(management_generations(Tier::Tier2), 3);
    }

    #[test]
    fn test_validate_rejects_bad_rates() {
        let mut cfg = TierConfig::default_for(Tier::Tier1);
        assert!(cfg.validate().is_ok());

        cfg.group_rate = Decimal::from(2);
        assert!(cfg.validate().unwrap_err().contains("groupRate"));

        let mut cfg = TierConfig::default_for(Tier::Tier1);
        cfg.package_value = -Decimal::one();
        assert!(cfg.validate().is_err());

        assert!(TierConfig::default_for(Tier::None).validate().is_err());
    }
}
