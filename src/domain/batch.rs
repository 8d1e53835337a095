//! Settlement batch grouping and batch-id derivation.

use super::{Address, CommissionId, Decimal};
use serde::Serialize;
use std::collections::BTreeMap;

/// Pending commissions owed to one wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletGroup {
    pub total_amount: Decimal,
    pub commission_ids: Vec<CommissionId>,
}

/// Recipients of a batch keyed by wallet; BTreeMap keeps the order stable.
pub type BatchRecipients = BTreeMap<Address, WalletGroup>;

/// One transfer inside a settlement batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementTransfer {
    pub address: Address,
    pub amount: Decimal,
}

/// Flatten recipients into the transfer list sent to the settlement client.
pub fn transfers_for(recipients: &BatchRecipients) -> Vec<SettlementTransfer> {
    recipients
        .iter()
        .map(|(address, group)| SettlementTransfer {
            address: address.clone(),
            amount: group.total_amount,
        })
        .collect()
}

/// Derive a batch id from the recipients alone.
///
/// The same commissions to the same wallets always hash to the same id, so
/// resubmitting a batch whose outcome was lost hits the settlement side's
/// batch-id dedup instead of paying twice. Commission ids are only ever paid
/// once, so a legitimate new batch never collides with an old one.
///
/// # Hash Collision Resistance
///
/// The SHA-256 digest is truncated to 128 bits, which is plenty for the
/// number of batches a single deployment will ever produce.
pub fn compute_batch_id(recipients: &BatchRecipients) -> String {
    use sha2::{Digest, Sha256};

    fn hash_var(hasher: &mut Sha256, data: &str) {
        hasher.update((data.len() as u32).to_le_bytes());
        hasher.update(data.as_bytes());
    }

    let mut hasher = Sha256::new();
    for (address, group) in recipients {
        hash_var(&mut hasher, address.as_str());
        hash_var(&mut hasher, &group.total_amount.to_canonical_string());
        hasher.update((group.commission_ids.len() as u32).to_le_bytes());
        for id in &group.commission_ids {
            hasher.update(id.as_i64().to_le_bytes());
        }
    }

    let hash = hasher.finalize();
    format!("batch:{}", hex::encode(&hash[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipients(amount: i64) -> BatchRecipients {
        let mut map = BTreeMap::new();
        map.insert(
            Address::new("0xabc".to_string()),
            WalletGroup {
                total_amount: Decimal::from(amount),
                commission_ids: vec![CommissionId(1), CommissionId(2)],
            },
        );
        map
    }

    #[test]
    fn test_batch_id_is_deterministic() {
        let a = compute_batch_id(&recipients(10));
        let b = compute_batch_id(&recipients(10));
        assert_eq!(a, b);
        assert!(a.starts_with("batch:"));
        assert_eq!(a.len(), "batch:".len() + 32);
    }

    #[test]
    fn test_batch_id_changes_with_content() {
        let base = compute_batch_id(&recipients(10));
        assert_ne!(base, compute_batch_id(&recipients(11)));

        let mut extra = recipients(10);
        if let Some(group) = extra.get_mut(&Address::new("0xabc".to_string())) {
            group.commission_ids.push(CommissionId(3));
        }
        assert_ne!(base, compute_batch_id(&extra));
    }

    #[test]
    fn test_transfers_for_orders_by_address() {
        let mut map = recipients(10);
        map.insert(
            Address::new("0x001".to_string()),
            WalletGroup {
                total_amount: Decimal::from(3),
                commission_ids: vec![CommissionId(9)],
            },
        );
        let transfers = transfers_for(&map);
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].address.as_str(), "0x001");
        assert_eq!(transfers[1].amount, Decimal::from(10));
    }
}
