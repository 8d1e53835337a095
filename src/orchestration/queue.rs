//! Background payout jobs.
//!
//! Jobs go through an mpsc channel to a worker task; each job runs on its own
//! task so a delayed per-order payout never holds up a sweep. The batcher's
//! single-sweep guard still serializes the actual settlement calls.

use crate::domain::{Decimal, OrderId};
use crate::payout::{PayoutBatcher, PayoutOutcome};
use anyhow::Context;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutJob {
    /// Settle one order's pending commissions after `delay`.
    Order { order_id: OrderId, delay: Duration },
    /// Settle the oldest pending commissions.
    Sweep {
        batch_size: i64,
        min_amount: Option<Decimal>,
    },
}

#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone)]
pub struct PayoutQueue {
    sender: mpsc::Sender<PayoutJob>,
    counters: Arc<Counters>,
}

impl PayoutQueue {
    /// Start the worker. It stops once every queue handle is dropped.
    pub fn spawn(batcher: Arc<PayoutBatcher>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let counters = Arc::new(Counters::default());
        let handle = tokio::spawn(run_worker(receiver, batcher, counters.clone()));
        (Self { sender, counters }, handle)
    }

    /// Queue a job. Returns false when the queue is full or closed.
    pub fn enqueue(&self, job: PayoutJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(job = ?job, "Payout queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(job = ?job, "Payout queue closed, dropping job");
                false
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<PayoutJob>,
    batcher: Arc<PayoutBatcher>,
    counters: Arc<Counters>,
) {
    while let Some(job) = receiver.recv().await {
        let batcher = batcher.clone();
        let counters = counters.clone();
        tokio::spawn(async move {
            match execute_job(&batcher, job).await {
                Ok(PayoutOutcome::Settled(receipt)) => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(batch_id = %receipt.batch_id, "Payout job settled");
                }
                Ok(outcome) => {
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!(outcome = ?outcome, "Payout job had nothing to do");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!(error = %format!("{:#}", e), "Payout job failed");
                }
            }
        });
    }
    info!("Payout queue closed, worker stopping");
}

/// Run one job to completion.
pub async fn execute_job(batcher: &PayoutBatcher, job: PayoutJob) -> anyhow::Result<PayoutOutcome> {
    match job {
        PayoutJob::Order { order_id, delay } => {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            batcher
                .payout_for_order(order_id)
                .await
                .with_context(|| format!("payout for order {}", order_id))
        }
        PayoutJob::Sweep {
            batch_size,
            min_amount,
        } => batcher
            .auto_payout(batch_size, min_amount)
            .await
            .context("scheduled payout sweep"),
    }
}

/// Enqueue a sweep every `interval`. The first sweep runs one interval after
/// start-up.
pub fn spawn_sweep_schedule(
    queue: PayoutQueue,
    interval: Duration,
    batch_size: i64,
    min_amount: Option<Decimal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("Scheduling payout sweep");
            if !queue.enqueue(PayoutJob::Sweep {
                batch_size,
                min_amount,
            }) {
                warn!("Scheduled sweep not queued");
            }
        }
    })
}
