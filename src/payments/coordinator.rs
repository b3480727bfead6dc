//! Payment coordinator — drives one purchase from offer to fulfilment.
//!
//! Offered → InvoiceSent → PreCheckoutPending → Confirmed | Declined.
//! The tracked state is advisory: a confirmation from the provider is
//! fulfilled even if the earlier steps were not observed (e.g. after a
//! restart), because the charge has already happened.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::conversation::{FlowKind, SessionStore};
use crate::entitlement::EntitlementGate;
use crate::error::{FlowError, PaymentError};
use crate::payments::{CatalogItem, PaymentProvider, PurchaseEvent, PurchaseOutcome, PurchaseStats};
use crate::profile::UserId;
use crate::store::UserRepository;
use crate::summary::{ProfileSummarizer, refresh_about};

/// Error text shown by the provider when pre-checkout is declined.
pub const PRE_CHECKOUT_DECLINE_MESSAGE: &str = "Something went wrong...";

/// Where a user's latest purchase stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseState {
    Offered,
    InvoiceSent,
    PreCheckoutPending,
    Confirmed,
    Declined,
}

impl PurchaseState {
    pub fn can_transition_to(&self, target: PurchaseState) -> bool {
        use PurchaseState::*;
        matches!(
            (self, target),
            (Offered, InvoiceSent)
                | (InvoiceSent, PreCheckoutPending)
                | (PreCheckoutPending, Confirmed)
                | (PreCheckoutPending, Declined)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Declined)
    }
}

impl std::fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Offered => "offered",
            Self::InvoiceSent => "invoice_sent",
            Self::PreCheckoutPending => "pre_checkout_pending",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingPurchase {
    item: Option<CatalogItem>,
    state: PurchaseState,
}

/// Answer given to a pre-checkout query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreCheckoutDecision {
    Approved(CatalogItem),
    Declined,
}

/// Effect delivered for a confirmed purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fulfilment {
    /// The profile summary was generated and stored.
    SummaryGenerated,
    /// Subscription active until the given instant.
    SubscriptionGranted { until: DateTime<Utc> },
    /// The user's conversation now waits for team requirements.
    TeamFindUnlocked,
}

/// Everything a purchase can touch.
pub struct PaymentCoordinator {
    provider: Arc<dyn PaymentProvider>,
    repo: Arc<dyn UserRepository>,
    gate: Arc<EntitlementGate>,
    summarizer: Arc<dyn ProfileSummarizer>,
    sessions: Arc<SessionStore>,
    stats: Arc<PurchaseStats>,
    purchases: DashMap<UserId, PendingPurchase>,
}

impl PaymentCoordinator {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        repo: Arc<dyn UserRepository>,
        gate: Arc<EntitlementGate>,
        summarizer: Arc<dyn ProfileSummarizer>,
        sessions: Arc<SessionStore>,
        stats: Arc<PurchaseStats>,
    ) -> Self {
        Self {
            provider,
            repo,
            gate,
            summarizer,
            sessions,
            stats,
            purchases: DashMap::new(),
        }
    }

    pub fn stats(&self) -> &Arc<PurchaseStats> {
        &self.stats
    }

    /// State of the user's latest purchase, if any.
    pub fn state(&self, user_id: UserId) -> Option<PurchaseState> {
        self.purchases.get(&user_id).map(|p| p.state)
    }

    fn advance(&self, user_id: UserId, item: Option<CatalogItem>, state: PurchaseState) {
        let previous = self.purchases.insert(user_id, PendingPurchase { item, state });
        if let Some(prev) = previous {
            if state != PurchaseState::Offered && !prev.state.can_transition_to(state) {
                debug!(user_id, from = %prev.state, to = %state, "Out-of-order purchase step");
            }
        }
    }

    /// Item of the user's latest purchase, if it named a catalog item.
    pub fn pending_item(&self, user_id: UserId) -> Option<CatalogItem> {
        self.purchases.get(&user_id).and_then(|p| p.item)
    }

    /// The user picked `item_id` from an offer: send the invoice.
    pub async fn offer(
        &self,
        user_id: UserId,
        chat_id: &str,
        item_id: &str,
    ) -> Result<CatalogItem, FlowError> {
        let item: CatalogItem = item_id.parse()?;
        self.advance(user_id, Some(item), PurchaseState::Offered);

        if let Err(e) = self.provider.send_invoice(chat_id, item).await {
            error!(user_id, item = %item, error = %e, "Failed to send invoice");
            self.purchases.remove(&user_id);
            return Err(e.into());
        }
        self.advance(user_id, Some(item), PurchaseState::InvoiceSent);
        debug!(user_id, item = %item, "Invoice sent");
        Ok(item)
    }

    /// Approve the pre-checkout query iff the payload names a catalog item.
    pub async fn pre_checkout(
        &self,
        user_id: UserId,
        query_id: &str,
        payload: &str,
    ) -> Result<PreCheckoutDecision, FlowError> {
        let item = payload.parse::<CatalogItem>().ok();
        if let (Some(offered), Some(paying)) = (self.pending_item(user_id), item) {
            if offered != paying {
                debug!(user_id, offered = %offered, paying = %paying, "Paying for an earlier invoice");
            }
        }
        self.advance(user_id, item, PurchaseState::PreCheckoutPending);

        let decision = match item {
            Some(item) => {
                self.provider.answer_pre_checkout(query_id, true, None).await?;
                PreCheckoutDecision::Approved(item)
            }
            None => {
                warn!(user_id, payload, "Declining pre-checkout for unknown item");
                self.provider
                    .answer_pre_checkout(query_id, false, Some(PRE_CHECKOUT_DECLINE_MESSAGE))
                    .await?;
                self.advance(user_id, None, PurchaseState::Declined);
                PreCheckoutDecision::Declined
            }
        };
        Ok(decision)
    }

    /// A payment succeeded: record it and deliver the item's effect.
    pub async fn confirm(
        &self,
        user_id: UserId,
        payload: &str,
        charge_id: &str,
    ) -> Result<Fulfilment, FlowError> {
        let item = match payload.parse::<CatalogItem>() {
            Ok(item) => item,
            Err(e) => {
                error!(user_id, payload, charge_id, "Payment confirmed for unknown item");
                return Err(e.into());
            }
        };
        self.advance(user_id, Some(item), PurchaseState::Confirmed);

        self.stats.record_purchase(PurchaseEvent {
            id: Uuid::new_v4(),
            item,
            user_id,
            charge_id: charge_id.to_string(),
            outcome: PurchaseOutcome::Succeeded,
            at: self.gate.now(),
        });
        info!(user_id, item = %item, charge_id, "Successful payment");

        let result = self.fulfil(user_id, item).await;
        if let Err(ref e) = result {
            error!(user_id, item = %item, charge_id, error = %e, "Purchase could not be fulfilled");
            self.stats.set_outcome(charge_id, PurchaseOutcome::Failed);
        }
        result
    }

    async fn fulfil(&self, user_id: UserId, item: CatalogItem) -> Result<Fulfilment, FlowError> {
        match item {
            CatalogItem::AboutUser => {
                refresh_about(self.repo.as_ref(), self.summarizer.as_ref(), user_id).await?;
                Ok(Fulfilment::SummaryGenerated)
            }
            CatalogItem::Vip => {
                let until = self.gate.grant_subscription(user_id).await?;
                Ok(Fulfilment::SubscriptionGranted { until })
            }
            CatalogItem::FindTeam => {
                self.sessions.begin(user_id, FlowKind::TeamFind).await;
                Ok(Fulfilment::TeamFindUnlocked)
            }
        }
    }

    /// Ask the provider to reverse `charge_id`.
    ///
    /// Provider failures are not told apart: unknown, foreign and already
    /// refunded charges all fail the same way.
    pub async fn refund(&self, user_id: UserId, charge_id: &str) -> Result<(), FlowError> {
        match self.provider.refund(user_id, charge_id).await {
            Ok(()) => {
                self.stats.record_refund(user_id);
                info!(user_id, charge_id, "Refund processed");
                Ok(())
            }
            Err(e) => {
                warn!(user_id, charge_id, error = %e, "Refund failed");
                Err(FlowError::Payment(PaymentError::Declined))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::conversation::FlowState;
    use crate::entitlement::{Clock, ManualClock};
    use crate::store::LibSqlBackend;
    use crate::summary::TemplateSummarizer;

    #[derive(Default)]
    struct FakeProvider {
        invoices: Mutex<Vec<(String, CatalogItem)>>,
        answers: Mutex<Vec<(String, bool, Option<String>)>>,
        refundable: Mutex<Vec<String>>,
        fail_invoices: bool,
    }

    #[async_trait]
    impl PaymentProvider for FakeProvider {
        async fn send_invoice(&self, chat_id: &str, item: CatalogItem) -> Result<(), PaymentError> {
            if self.fail_invoices {
                return Err(PaymentError::Provider("boom".into()));
            }
            self.invoices.lock().unwrap().push((chat_id.into(), item));
            Ok(())
        }

        async fn answer_pre_checkout(
            &self,
            query_id: &str,
            ok: bool,
            error_message: Option<&str>,
        ) -> Result<(), PaymentError> {
            self.answers
                .lock()
                .unwrap()
                .push((query_id.into(), ok, error_message.map(String::from)));
            Ok(())
        }

        async fn refund(&self, _user_id: UserId, charge_id: &str) -> Result<(), PaymentError> {
            let mut refundable = self.refundable.lock().unwrap();
            match refundable.iter().position(|c| c == charge_id) {
                Some(i) => {
                    refundable.remove(i);
                    Ok(())
                }
                None => Err(PaymentError::Provider("CHARGE_NOT_FOUND".into())),
            }
        }
    }

    struct Fixture {
        coordinator: PaymentCoordinator,
        provider: Arc<FakeProvider>,
        repo: Arc<LibSqlBackend>,
        sessions: Arc<SessionStore>,
        clock: Arc<ManualClock>,
    }

    async fn fixture_with(provider: FakeProvider) -> Fixture {
        let provider = Arc::new(provider);
        let repo = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        repo.create(1, Some("Ann"), None).await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gate = Arc::new(EntitlementGate::new(repo.clone(), clock.clone()));
        let sessions = Arc::new(SessionStore::new(clock.clone(), Duration::minutes(30)));
        let coordinator = PaymentCoordinator::new(
            provider.clone(),
            repo.clone(),
            gate,
            Arc::new(TemplateSummarizer),
            sessions.clone(),
            Arc::new(PurchaseStats::new()),
        );
        Fixture {
            coordinator,
            provider,
            repo,
            sessions,
            clock,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(FakeProvider::default()).await
    }

    #[tokio::test]
    async fn happy_path_walks_every_state() {
        let f = fixture().await;
        let item = f.coordinator.offer(1, "chat-1", "vip").await.unwrap();
        assert_eq!(item, CatalogItem::Vip);
        assert_eq!(f.coordinator.state(1), Some(PurchaseState::InvoiceSent));
        assert_eq!(
            f.provider.invoices.lock().unwrap().as_slice(),
            &[("chat-1".to_string(), CatalogItem::Vip)]
        );

        let decision = f.coordinator.pre_checkout(1, "q1", "vip").await.unwrap();
        assert_eq!(decision, PreCheckoutDecision::Approved(CatalogItem::Vip));
        assert_eq!(f.coordinator.state(1), Some(PurchaseState::PreCheckoutPending));
        assert_eq!(f.coordinator.pending_item(1), Some(CatalogItem::Vip));

        let done = f.coordinator.confirm(1, "vip", "ch_1").await.unwrap();
        let until = match done {
            Fulfilment::SubscriptionGranted { until } => until,
            other => panic!("expected subscription, got {other:?}"),
        };
        assert_eq!(until - f.clock.now(), Duration::days(30));
        assert_eq!(f.coordinator.state(1), Some(PurchaseState::Confirmed));
        assert_eq!(f.coordinator.stats().purchases(1), 1);
        assert!(f.repo.get(1).await.unwrap().is_vip_at(f.clock.now()));
    }

    #[tokio::test]
    async fn unknown_offer_is_rejected_without_invoice() {
        let f = fixture().await;
        let err = f.coordinator.offer(1, "chat", "premium").await.unwrap_err();
        assert!(matches!(err, FlowError::Payment(PaymentError::UnknownItem(_))));
        assert!(f.provider.invoices.lock().unwrap().is_empty());
        assert_eq!(f.coordinator.state(1), None);
    }

    #[tokio::test]
    async fn failed_invoice_clears_purchase() {
        let f = fixture_with(FakeProvider {
            fail_invoices: true,
            ..Default::default()
        })
        .await;
        let err = f.coordinator.offer(1, "chat", "find_team").await.unwrap_err();
        assert!(matches!(err, FlowError::Payment(_)));
        assert_eq!(f.coordinator.state(1), None);
    }

    #[tokio::test]
    async fn paying_an_earlier_invoice_tracks_the_paid_item() {
        let f = fixture().await;
        f.coordinator.offer(1, "chat", "about_user_dict").await.unwrap();
        f.coordinator.offer(1, "chat", "vip").await.unwrap();
        assert_eq!(f.coordinator.pending_item(1), Some(CatalogItem::Vip));

        let decision = f.coordinator.pre_checkout(1, "q2", "about_user_dict").await.unwrap();
        assert_eq!(decision, PreCheckoutDecision::Approved(CatalogItem::AboutUser));
        assert_eq!(f.coordinator.pending_item(1), Some(CatalogItem::AboutUser));
    }

    #[tokio::test]
    async fn tampered_payload_is_declined() {
        let f = fixture().await;
        let decision = f.coordinator.pre_checkout(1, "q9", "free_stuff").await.unwrap();
        assert_eq!(decision, PreCheckoutDecision::Declined);
        assert_eq!(f.coordinator.state(1), Some(PurchaseState::Declined));
        assert_eq!(
            f.provider.answers.lock().unwrap().as_slice(),
            &[(
                "q9".to_string(),
                false,
                Some(PRE_CHECKOUT_DECLINE_MESSAGE.to_string())
            )]
        );
    }

    #[tokio::test]
    async fn summary_purchase_stores_about_text() {
        let f = fixture().await;
        let done = f.coordinator.confirm(1, "about_user_dict", "ch_2").await.unwrap();
        assert_eq!(done, Fulfilment::SummaryGenerated);
        assert!(f.repo.get(1).await.unwrap().about_user.is_some());
        // One-off purchases never grant standing access.
        assert!(f.repo.get(1).await.unwrap().vip_until.is_none());
    }

    #[tokio::test]
    async fn team_find_purchase_opens_requirements_step() {
        let f = fixture().await;
        let done = f.coordinator.confirm(1, "find_team", "ch_3").await.unwrap();
        assert_eq!(done, Fulfilment::TeamFindUnlocked);
        let session = f.sessions.get(1).await.unwrap();
        assert_eq!(session.kind, FlowKind::TeamFind);
        assert_eq!(session.state, FlowState::AwaitingRequirements);
    }

    #[tokio::test]
    async fn failed_fulfilment_is_recorded_as_failed() {
        let f = fixture().await;
        let err = f.coordinator.confirm(42, "vip", "ch_4").await.unwrap_err();
        assert!(matches!(err, FlowError::NotFound(42)));
        let event = f.coordinator.stats().event("ch_4").unwrap();
        assert_eq!(event.outcome, PurchaseOutcome::Failed);
        assert_eq!(f.coordinator.stats().purchases(42), 1);
    }

    #[tokio::test]
    async fn bogus_refund_fails_without_counting() {
        let f = fixture().await;
        let err = f.coordinator.refund(1, "bogus-charge-id").await.unwrap_err();
        assert!(matches!(err, FlowError::Payment(PaymentError::Declined)));
        assert_eq!(f.coordinator.stats().refunds(1), 0);
    }

    #[tokio::test]
    async fn refund_counts_once_and_second_attempt_fails() {
        let f = fixture().await;
        f.provider.refundable.lock().unwrap().push("ch_5".into());

        f.coordinator.refund(1, "ch_5").await.unwrap();
        assert_eq!(f.coordinator.stats().refunds(1), 1);

        assert!(f.coordinator.refund(1, "ch_5").await.is_err());
        assert_eq!(f.coordinator.stats().refunds(1), 1);
    }

    #[test]
    fn purchase_transitions() {
        use PurchaseState::*;
        assert!(Offered.can_transition_to(InvoiceSent));
        assert!(PreCheckoutPending.can_transition_to(Declined));
        assert!(!Offered.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Offered));
        assert!(Confirmed.is_terminal() && Declined.is_terminal());
        assert!(!InvoiceSent.is_terminal());
    }
}
