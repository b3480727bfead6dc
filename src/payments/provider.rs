//! Payment provider seam.

use async_trait::async_trait;

use crate::error::PaymentError;
use crate::payments::CatalogItem;
use crate::profile::UserId;

/// The external payment provider, reduced to what the coordinator needs.
///
/// Failures are opaque: the provider does not report why a call failed.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Send an invoice for `item` to `chat_id`, with the item id as payload.
    async fn send_invoice(&self, chat_id: &str, item: CatalogItem) -> Result<(), PaymentError>;

    /// Answer a pre-checkout query.
    async fn answer_pre_checkout(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<&str>,
    ) -> Result<(), PaymentError>;

    /// Reverse a completed charge.
    async fn refund(&self, user_id: UserId, charge_id: &str) -> Result<(), PaymentError>;
}
