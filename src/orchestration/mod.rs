//! Wiring between the engine, payouts and the outside world.

use crate::config::Config;
use crate::db::Repository;
use crate::engine::{
    Clock, CommissionCalculator, ConfigStore, MilestoneEngine, ReconsumptionGate,
};
use crate::payout::{AuditTrail, PayoutBatcher};
use crate::settlement::SettlementClient;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub mod pipeline;
pub mod queue;

pub use pipeline::OrderPipeline;
pub use queue::{execute_job, spawn_sweep_schedule, PayoutJob, PayoutQueue, QueueStats};

/// Every long-lived component of the service, built once at start-up.
#[derive(Clone)]
pub struct Services {
    pub repo: Arc<Repository>,
    pub configs: Arc<ConfigStore>,
    pub gate: Arc<ReconsumptionGate>,
    pub calculator: Arc<CommissionCalculator>,
    pub payouts: Arc<PayoutBatcher>,
    pub milestones: Arc<MilestoneEngine>,
    pub queue: PayoutQueue,
    pub pipeline: OrderPipeline,
}

impl Services {
    /// Build the component graph and start the payout worker.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(
        config: &Config,
        repo: Arc<Repository>,
        client: Arc<dyn SettlementClient>,
        clock: Arc<dyn Clock>,
    ) -> (Self, JoinHandle<()>) {
        let configs = Arc::new(ConfigStore::new(
            repo.clone(),
            clock.clone(),
            config.config_cache_ttl,
        ));
        let gate = Arc::new(ReconsumptionGate::new(configs.clone()));
        let calculator = Arc::new(CommissionCalculator::new(
            repo.clone(),
            configs.clone(),
            config.milestone_rewards.clone(),
            clock.clone(),
        ));
        let payouts = Arc::new(PayoutBatcher::new(
            repo.clone(),
            client,
            AuditTrail::new(repo.clone()),
            clock.clone(),
        ));
        let milestones = Arc::new(MilestoneEngine::new(
            repo.clone(),
            configs.clone(),
            payouts.clone(),
            config.milestone_rewards.clone(),
            clock,
        ));

        let (queue, worker) = PayoutQueue::spawn(payouts.clone());
        let pipeline = OrderPipeline::new(
            calculator.clone(),
            milestones.clone(),
            config.payout_on_approval.then(|| queue.clone()),
            config.payout_after_approval_delay,
        );

        (
            Self {
                repo,
                configs,
                gate,
                calculator,
                payouts,
                milestones,
                queue,
                pipeline,
            },
            worker,
        )
    }
}
