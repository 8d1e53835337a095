//! In-memory settlement client for tests and local runs.

use super::{SettlementClient, SettlementError, SettlementReceipt};
use crate::domain::{Decimal, SettlementTransfer};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct MockState {
    balance: Decimal,
    processed: HashMap<String, Vec<SettlementTransfer>>,
    fail_next: Option<SettlementError>,
    submissions: usize,
}

/// Mock settlement client that records batches in memory.
///
/// Honours batch-id dedup and debits its balance on every successful batch.
#[derive(Debug)]
pub struct MockSettlementClient {
    state: Mutex<MockState>,
}

impl MockSettlementClient {
    /// Create a mock with the given contract balance.
    pub fn new(balance: Decimal) -> Self {
        Self {
            state: Mutex::new(MockState {
                balance,
                ..Default::default()
            }),
        }
    }

    /// Make the next `submit_batch` call fail with `error`.
    pub fn fail_next_submission(&self, error: SettlementError) {
        self.lock().fail_next = Some(error);
    }

    /// Mark a batch id as processed without moving funds.
    pub fn mark_processed(&self, batch_id: &str) {
        self.lock().processed.insert(batch_id.to_string(), Vec::new());
    }

    /// Transfers recorded for a processed batch.
    pub fn transfers_for(&self, batch_id: &str) -> Option<Vec<SettlementTransfer>> {
        self.lock().processed.get(batch_id).cloned()
    }

    /// Number of successful submissions.
    pub fn submissions(&self) -> usize {
        self.lock().submissions
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not hide state from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockSettlementClient {
    fn default() -> Self {
        Self::new(Decimal::from(1_000_000))
    }
}

#[async_trait]
impl SettlementClient for MockSettlementClient {
    async fn submit_batch(
        &self,
        batch_id: &str,
        transfers: &[SettlementTransfer],
    ) -> Result<SettlementReceipt, SettlementError> {
        let mut state = self.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        if state.processed.contains_key(batch_id) {
            return Err(SettlementError::AlreadyProcessed(batch_id.to_string()));
        }
        if transfers.is_empty() {
            return Err(SettlementError::Rejected("empty batch".to_string()));
        }

        let required: Decimal = transfers.iter().map(|t| t.amount).sum();
        if required > state.balance {
            return Err(SettlementError::InsufficientBalance {
                required,
                available: state.balance,
            });
        }

        state.balance = state.balance - required;
        state.submissions += 1;
        state
            .processed
            .insert(batch_id.to_string(), transfers.to_vec());

        Ok(SettlementReceipt {
            tx_id: format!("0xmock{:04}", state.submissions),
            block_ref: Some(state.submissions.to_string()),
        })
    }

    async fn is_batch_processed(&self, batch_id: &str) -> Result<bool, SettlementError> {
        Ok(self.lock().processed.contains_key(batch_id))
    }

    async fn balance(&self) -> Result<Decimal, SettlementError> {
        Ok(self.lock().balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Address;

    fn transfer(addr: &str, amount: i64) -> SettlementTransfer {
        SettlementTransfer {
            address: Address::new(addr.to_string()),
            amount: Decimal::from(amount),
        }
    }

    #[tokio::test]
    async fn test_submit_debits_balance_and_dedups() {
        let mock = MockSettlementClient::new(Decimal::from(100));
        let receipt = mock
            .submit_batch("batch:1", &[transfer("0xa", 30), transfer("0xb", 20)])
            .await
            .unwrap();
        assert_eq!(receipt.tx_id, "0xmock0001");
        assert_eq!(mock.balance().await.unwrap(), Decimal::from(50));
        assert!(mock.is_batch_processed("batch:1").await.unwrap());

        let again = mock.submit_batch("batch:1", &[transfer("0xa", 1)]).await;
        assert_eq!(
            again,
            Err(SettlementError::AlreadyProcessed("batch:1".to_string()))
        );
        assert_eq!(mock.submissions(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let mock = MockSettlementClient::new(Decimal::from(10));
        let result = mock.submit_batch("batch:2", &[transfer("0xa", 11)]).await;
        assert!(matches!(
            result,
            Err(SettlementError::InsufficientBalance { .. })
        ));
        assert!(!mock.is_batch_processed("batch:2").await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_next_submission_is_one_shot() {
        let mock = MockSettlementClient::default();
        mock.fail_next_submission(SettlementError::NetworkError("down".to_string()));
        assert!(mock.submit_batch("batch:3", &[transfer("0xa", 1)]).await.is_err());
        assert!(mock.submit_batch("batch:3", &[transfer("0xa", 1)]).await.is_ok());
    }
}
