use crate::domain::{Decimal, MilestoneRewards};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub settlement_api_url: String,
    pub config_cache_ttl: Duration,
    pub auto_payout_batch_size: i64,
    pub auto_payout_min_amount: Option<Decimal>,
    /// None disables the scheduled sweep.
    pub payout_sweep_interval: Option<Duration>,
    pub payout_on_approval: bool,
    pub payout_after_approval_delay: Duration,
    pub milestone_rewards: MilestoneRewards,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let settlement_api_url = required(&env_map, "SETTLEMENT_API_URL")?;

        let config_cache_ttl = Duration::from_millis(parse_u64(&env_map, "CONFIG_CACHE_TTL_MS", 300_000)?);

        let auto_payout_batch_size = env_map
            .get("AUTO_PAYOUT_BATCH_SIZE")
            .map(|s| s.as_str())
            .unwrap_or("50")
            .parse::<i64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "AUTO_PAYOUT_BATCH_SIZE".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let auto_payout_min_amount = env_map
            .get("AUTO_PAYOUT_MIN_AMOUNT")
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_amount("AUTO_PAYOUT_MIN_AMOUNT", s))
            .transpose()?;

        let payout_sweep_interval =
            match parse_u64(&env_map, "PAYOUT_SWEEP_INTERVAL_MS", 600_000)? {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            };

        let payout_on_approval = match env_map
            .get("PAYOUT_ON_APPROVAL")
            .map(|s| s.as_str())
            .unwrap_or("true")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "PAYOUT_ON_APPROVAL".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let payout_after_approval_delay =
            Duration::from_millis(parse_u64(&env_map, "PAYOUT_AFTER_APPROVAL_DELAY_MS", 5_000)?);

        let defaults = MilestoneRewards::default();
        let milestone_rewards = MilestoneRewards {
            x: reward(&env_map, "MILESTONE_REWARD_X", defaults.x)?,
            y: reward(&env_map, "MILESTONE_REWARD_Y", defaults.y)?,
            z: reward(&env_map, "MILESTONE_REWARD_Z", defaults.z)?,
        };

        Ok(Config {
            port,
            database_path,
            settlement_api_url,
            config_cache_ttl,
            auto_payout_batch_size,
            auto_payout_min_amount,
            payout_sweep_interval,
            payout_on_approval,
            payout_after_approval_delay,
            milestone_rewards,
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_u64(env_map: &HashMap<String, String>, key: &str, default: u64) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        Some(s) => s.trim().parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a non-negative integer".to_string())
        }),
        None => Ok(default),
    }
}

fn parse_amount(key: &str, raw: &str) -> Result<Decimal, ConfigError> {
    let amount = Decimal::from_str(raw.trim()).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), format!("not a decimal: {}", raw))
    })?;
    if amount.is_negative() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(amount)
}

fn reward(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match env_map.get(key) {
        Some(raw) => parse_amount(key, raw),
        None => Ok(default),
    }
}
