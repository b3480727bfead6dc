//! Purchase and refund counters, plus a ledger of confirmed charges.
//!
//! Process-wide and ephemeral: everything resets on restart.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payments::CatalogItem;
use crate::profile::UserId;

/// Whether the purchased effect was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Succeeded,
    Failed,
}

/// One confirmed charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub id: Uuid,
    pub item: CatalogItem,
    pub user_id: UserId,
    pub charge_id: String,
    pub outcome: PurchaseOutcome,
    pub at: DateTime<Utc>,
}

/// Thread-safe audit counters keyed by user id.
///
/// `DashMap::entry` locks the shard for the key, so increments from
/// concurrent turns never lose updates.
#[derive(Debug, Default)]
pub struct PurchaseStats {
    purchases: DashMap<UserId, u64>,
    refunds: DashMap<UserId, u64>,
    ledger: DashMap<String, PurchaseEvent>,
}

impl PurchaseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_purchase(&self, event: PurchaseEvent) {
        *self.purchases.entry(event.user_id).or_default() += 1;
        self.ledger.insert(event.charge_id.clone(), event);
    }

    pub fn record_refund(&self, user_id: UserId) {
        *self.refunds.entry(user_id).or_default() += 1;
    }

    pub fn purchases(&self, user_id: UserId) -> u64 {
        self.purchases.get(&user_id).map(|c| *c).unwrap_or(0)
    }

    pub fn refunds(&self, user_id: UserId) -> u64 {
        self.refunds.get(&user_id).map(|c| *c).unwrap_or(0)
    }

    /// Look up a confirmed charge.
    pub fn event(&self, charge_id: &str) -> Option<PurchaseEvent> {
        self.ledger.get(charge_id).map(|e| e.clone())
    }

    /// Mark a ledger entry's outcome after fulfilment.
    pub fn set_outcome(&self, charge_id: &str, outcome: PurchaseOutcome) {
        if let Some(mut event) = self.ledger.get_mut(charge_id) {
            event.outcome = outcome;
        }
    }
}
