pub mod audit;
pub mod commissions;
pub mod health;
pub mod members;
pub mod orders;
pub mod payouts;
pub mod tier_config;

use crate::config::Config;
use crate::db::Repository;
use crate::engine::{ConfigStore, ReconsumptionGate};
use crate::orchestration::{OrderPipeline, PayoutQueue, Services};
use crate::payout::PayoutBatcher;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub configs: Arc<ConfigStore>,
    pub gate: Arc<ReconsumptionGate>,
    pub pipeline: OrderPipeline,
    pub payouts: Arc<PayoutBatcher>,
    pub queue: PayoutQueue,
}

impl AppState {
    pub fn new(services: &Services, config: Config) -> Self {
        Self {
            repo: services.repo.clone(),
            config,
            configs: services.configs.clone(),
            gate: services.gate.clone(),
            pipeline: services.pipeline.clone(),
            payouts: services.payouts.clone(),
            queue: services.queue.clone(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/members", post(members::register_member))
        .route("/v1/members/:id", get(members::get_member))
        .route("/v1/members/:id/registered", post(members::member_registered))
        .route("/v1/members/:id/side/:ancestor_id", get(members::member_side))
        .route("/v1/orders", post(orders::record_order))
        .route("/v1/orders/:id/confirmed", post(orders::order_confirmed))
        .route("/v1/commissions", get(commissions::list_commissions))
        .route("/v1/commissions/pending", get(commissions::pending_commissions))
        .route(
            "/v1/commissions/:id/approve",
            post(commissions::approve_commission),
        )
        .route("/v1/payouts/stats", get(payouts::payout_stats))
        .route("/v1/payouts/batch", post(payouts::manual_batch))
        .route("/v1/payouts/auto", post(payouts::auto_payout))
        .route("/v1/payouts/orders/:id", post(payouts::order_payout))
        .route("/v1/audit", get(audit::get_audit))
        .route("/v1/audit/export", get(audit::export_audit))
        .route(
            "/v1/config/:tier",
            get(tier_config::get_tier_config).put(tier_config::put_tier_config),
        )
        .layer(cors)
        .with_state(state)
}
