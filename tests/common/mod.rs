#![allow(dead_code)]

use commission_engine::config::Config;
use commission_engine::db::init_db;
use commission_engine::domain::{
    Address, Commission, Decimal, LegSide, MemberId, MilestoneRewards, NewMember, OrderId,
    OrderStatus, Tier,
};
use commission_engine::engine::{Clock, ManualClock};
use commission_engine::settlement::{MockSettlementClient, SettlementClient};
use commission_engine::{Repository, Services, TimeMs};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct Harness {
    pub repo: Arc<Repository>,
    pub services: Services,
    pub config: Config,
    pub mock: Arc<MockSettlementClient>,
    pub clock: Arc<ManualClock>,
    _temp: TempDir,
}

pub fn test_config(database_path: String) -> Config {
    Config {
        port: 0,
        database_path,
        settlement_api_url: "http://example.invalid".to_string(),
        config_cache_ttl: Duration::from_secs(300),
        auto_payout_batch_size: 50,
        auto_payout_min_amount: None,
        payout_sweep_interval: None,
        payout_on_approval: false,
        payout_after_approval_delay: Duration::ZERO,
        milestone_rewards: MilestoneRewards::default(),
    }
}

pub async fn harness() -> Harness {
    harness_with(MockSettlementClient::default()).await
}

pub async fn harness_with(mock: MockSettlementClient) -> Harness {
    build_harness(mock, |mock| -> Arc<dyn SettlementClient> { mock }, |_| {}).await
}

/// Harness whose settlement client wraps the mock and whose config is
/// adjusted by `tweak` before the services are built.
pub async fn build_harness(
    mock: MockSettlementClient,
    wrap: impl FnOnce(Arc<MockSettlementClient>) -> Arc<dyn SettlementClient>,
    tweak: impl FnOnce(&mut Config),
) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let mut config = test_config(db_path);
    tweak(&mut config);
    let mock = Arc::new(mock);
    let client = wrap(mock.clone());
    let clock = Arc::new(ManualClock::new(TimeMs::new(1_700_000_000_000)));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let (services, _worker) = Services::build(&config, repo.clone(), client, dyn_clock);

    Harness {
        repo,
        services,
        config,
        mock,
        clock,
        _temp: temp_dir,
    }
}

/// Register a member with a wallet of the form `0xwallet{id}`.
pub async fn add_member(
    repo: &Repository,
    id: i64,
    parent: Option<(i64, LegSide)>,
    referrer: Option<i64>,
) {
    let inserted = repo
        .insert_member(&NewMember {
            id: MemberId(id),
            parent_id: parent.map(|(p, _)| MemberId(p)),
            position: parent.map(|(_, s)| s),
            referrer_id: referrer.map(MemberId),
            wallet_address: Some(Address::new(format!("0xwallet{}", id))),
        })
        .await
        .unwrap();
    assert!(inserted, "member {} already exists", id);
}

pub async fn set_tier(repo: &Repository, id: i64, tier: Tier) {
    assert!(repo.set_member_tier(MemberId(id), tier).await.unwrap());
}

pub async fn confirmed_order(repo: &Repository, id: i64, buyer: i64, amount: i64) -> OrderId {
    let inserted = repo
        .insert_order(
            OrderId(id),
            MemberId(buyer),
            Decimal::from(amount),
            OrderStatus::Confirmed,
        )
        .await
        .unwrap();
    assert!(inserted, "order {} already exists", id);
    OrderId(id)
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn total(commissions: &[Commission]) -> Decimal {
    commissions.iter().map(|c| c.amount).sum()
}
