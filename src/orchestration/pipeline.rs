use super::queue::{PayoutJob, PayoutQueue};
use crate::domain::{CommissionStatus, MemberId, OrderId};
use crate::engine::{
    CommissionCalculator, CommissionError, MilestoneEngine, MilestoneOutcome, OrderSummary,
    ProcessOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Entry points for the order and member subsystems.
#[derive(Clone)]
pub struct OrderPipeline {
    calculator: Arc<CommissionCalculator>,
    milestones: Arc<MilestoneEngine>,
    payouts: Option<PayoutQueue>,
    payout_delay: Duration,
}

impl OrderPipeline {
    /// `payouts` set to None disables the post-approval payout.
    pub fn new(
        calculator: Arc<CommissionCalculator>,
        milestones: Arc<MilestoneEngine>,
        payouts: Option<PayoutQueue>,
        payout_delay: Duration,
    ) -> Self {
        Self {
            calculator,
            milestones,
            payouts,
            payout_delay,
        }
    }

    /// Run commissions for a confirmed order.
    ///
    /// Safe to call more than once per order. Commission failures are
    /// reported in the outcome and never surface as an error to the caller,
    /// so they cannot hold up the order itself.
    pub async fn on_order_confirmed(&self, order_id: OrderId) -> ProcessOutcome {
        let mut outcome = self.calculator.process(order_id).await;
        if let ProcessOutcome::Processed(summary) = &mut outcome {
            self.after_commit(summary).await;
        }
        outcome
    }

    async fn after_commit(&self, summary: &mut OrderSummary) {
        // A milestone reached by this purchase is paid immediately.
        if let Some(MilestoneOutcome::Awarded {
            commission_id,
            settled,
            ..
        }) = &mut summary.milestone
        {
            *settled = self.milestones.settle_now(*commission_id).await;
            if *settled {
                let id = *commission_id;
                for c in summary.commissions.iter_mut().filter(|c| c.id == id) {
                    c.status = CommissionStatus::Paid;
                }
            }
            debug!(order_id = %summary.order_id, settled = *settled, "Milestone settlement attempted");
        }

        if summary.has_pending() {
            if let Some(queue) = &self.payouts {
                if !queue.enqueue(PayoutJob::Order {
                    order_id: summary.order_id,
                    delay: self.payout_delay,
                }) {
                    warn!(order_id = %summary.order_id, "Post-approval payout not queued");
                }
            }
        }
    }

    /// Registration event from the member subsystem.
    pub async fn on_member_registered(
        &self,
        member_id: MemberId,
    ) -> Result<MilestoneOutcome, CommissionError> {
        self.milestones.on_registration(member_id).await
    }
}
