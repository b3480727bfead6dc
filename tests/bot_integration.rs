//! End-to-end tests for the bot dispatcher.
//!
//! Each test wires the real engine, gate and payment coordinator to an
//! in-memory database and a recording channel that doubles as the payment
//! provider, then drives it with inbound events.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tokio::time::timeout;

use team_finder::bot::{Bot, BotDeps};
use team_finder::channels::{Channel, IncomingMessage, MessageKind, MessageStream, OutgoingResponse};
use team_finder::conversation::{ConversationEngine, FlowKind, FlowState, SessionStore};
use team_finder::entitlement::{EntitlementGate, ManualClock};
use team_finder::error::{ChannelError, PaymentError};
use team_finder::payments::{CatalogItem, PaymentCoordinator, PaymentProvider, PurchaseStats};
use team_finder::profile::UserId;
use team_finder::store::{LibSqlBackend, UserRepository};
use team_finder::summary::TemplateSummarizer;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Channel that replays queued events and records every reply.
#[derive(Default)]
struct RecordingChannel {
    inbound: Mutex<Vec<IncomingMessage>>,
    sent: Mutex<Vec<(UserId, OutgoingResponse)>>,
    invoices: Mutex<Vec<(String, CatalogItem)>>,
    acknowledged: Mutex<usize>,
}

impl RecordingChannel {
    fn replies_to(&self, user_id: UserId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, r)| r.content.clone())
            .collect()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let events: Vec<IncomingMessage> = std::mem::take(&mut *self.inbound.lock().unwrap());
        Ok(futures::stream::iter(events).boxed())
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push((msg.user_id, response));
        Ok(())
    }

    async fn acknowledge(&self, _msg: &IncomingMessage) -> Result<(), ChannelError> {
        *self.acknowledged.lock().unwrap() += 1;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for RecordingChannel {
    async fn send_invoice(&self, chat_id: &str, item: CatalogItem) -> Result<(), PaymentError> {
        self.invoices.lock().unwrap().push((chat_id.to_string(), item));
        Ok(())
    }

    async fn answer_pre_checkout(
        &self,
        _query_id: &str,
        _ok: bool,
        _error_message: Option<&str>,
    ) -> Result<(), PaymentError> {
        Ok(())
    }

    async fn refund(&self, _user_id: UserId, _charge_id: &str) -> Result<(), PaymentError> {
        Err(PaymentError::Provider("CHARGE_NOT_FOUND".into()))
    }
}

struct Harness {
    bot: Arc<Bot>,
    channel: Arc<RecordingChannel>,
    repo: Arc<LibSqlBackend>,
    gate: Arc<EntitlementGate>,
    sessions: Arc<SessionStore>,
    payments: Arc<PaymentCoordinator>,
}

async fn harness() -> Harness {
    let repo = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let gate = Arc::new(EntitlementGate::new(repo.clone(), clock.clone()));
    let sessions = Arc::new(SessionStore::new(clock, chrono::Duration::minutes(30)));
    let channel = Arc::new(RecordingChannel::default());
    let summarizer = Arc::new(TemplateSummarizer);
    let payments = Arc::new(PaymentCoordinator::new(
        channel.clone(),
        repo.clone(),
        gate.clone(),
        summarizer.clone(),
        sessions.clone(),
        Arc::new(PurchaseStats::new()),
    ));
    let engine = Arc::new(ConversationEngine::new(repo.clone(), sessions.clone()));
    let deps = BotDeps {
        repo: repo.clone(),
        gate: gate.clone(),
        engine,
        payments: payments.clone(),
        summarizer,
    };
    let bot = Arc::new(Bot::new(deps, channel.clone()));
    Harness {
        bot,
        channel,
        repo,
        gate,
        sessions,
        payments,
    }
}

fn text(user_id: UserId, content: &str) -> IncomingMessage {
    IncomingMessage::text("recording", user_id, content)
        .with_user_name("Ann")
        .with_username("ann")
        .with_metadata(serde_json::json!({"chat_id": user_id.to_string()}))
}

impl Harness {
    async fn say(&self, user_id: UserId, content: &str) -> Option<String> {
        self.bot
            .handle(&text(user_id, content))
            .await
            .map(|r| r.content)
    }
}

#[tokio::test]
async fn registration_stores_contacts() {
    let h = harness().await;
    assert_eq!(
        h.say(1, "/sign_up").await.as_deref(),
        Some("📱 Enter your phone number:")
    );
    assert_eq!(
        h.say(1, "+15551234567").await.as_deref(),
        Some("✉️ Now enter your email:")
    );
    assert_eq!(
        h.say(1, "ann@example.com").await.as_deref(),
        Some("✅ Registration complete!")
    );

    let user = h.repo.get(1).await.unwrap();
    assert_eq!(user.name.as_deref(), Some("Ann"));
    assert_eq!(user.phone.as_deref(), Some("+15551234567"));
    assert_eq!(user.email.as_deref(), Some("ann@example.com"));
    assert!(h.sessions.get(1).await.is_none());

    assert_eq!(
        h.say(1, "/sign_up").await.as_deref(),
        Some("You're already registered. Use /modify to change your info.")
    );
}

#[tokio::test]
async fn modify_replaces_phone_then_email() {
    let h = harness().await;
    h.say(1, "/sign_up").await;
    h.say(1, "+15551234567").await;
    h.say(1, "ann@example.com").await;

    assert_eq!(
        h.say(1, "/modify").await.as_deref(),
        Some("📱 Enter your new phone number:")
    );
    assert_eq!(
        h.say(1, "+15557654321").await.as_deref(),
        Some("✉️ Now enter your email:")
    );
    // Nothing is written until the email arrives.
    assert_eq!(
        h.repo.get(1).await.unwrap().phone.as_deref(),
        Some("+15551234567")
    );
    assert_eq!(
        h.say(1, "ann@work.example").await.as_deref(),
        Some("✅ Contact details updated.")
    );

    let user = h.repo.get(1).await.unwrap();
    assert_eq!(user.phone.as_deref(), Some("+15557654321"));
    assert_eq!(user.email.as_deref(), Some("ann@work.example"));
    assert!(h.sessions.get(1).await.is_none());
}

#[tokio::test]
async fn invalid_phone_reprompts_in_place() {
    let h = harness().await;
    h.say(1, "/sign_up").await;
    assert_eq!(
        h.say(1, "12ab").await.as_deref(),
        Some("❌ Invalid phone number. Try again.")
    );
    assert_eq!(h.sessions.get(1).await.unwrap().state, FlowState::AwaitingPhone);
    assert!(h.repo.get(1).await.unwrap().phone.is_none());

    assert_eq!(
        h.say(1, "+15551234567").await.as_deref(),
        Some("✉️ Now enter your email:")
    );
}

#[tokio::test]
async fn portfolio_appends_in_order() {
    let h = harness().await;
    h.repo.create(1, Some("Ann"), None).await.unwrap();

    assert_eq!(
        h.say(1, "/portfolio").await.as_deref(),
        Some("📂 Your portfolio is empty.\nUse /add_project to list your first project.")
    );

    for project in ["Chat bot", "Compiler"] {
        h.say(1, "/add_project").await;
        assert_eq!(
            h.say(1, project).await.as_deref(),
            Some("✅ Project added to your portfolio!")
        );
    }

    assert_eq!(
        h.say(1, "/portfolio").await.as_deref(),
        Some("📂 Your Completed Projects:\nChat bot\n\nCompiler")
    );
}

#[tokio::test]
async fn profile_requires_registration() {
    let h = harness().await;
    assert_eq!(
        h.say(5, "/profile").await.as_deref(),
        Some("You don't have a profile yet. Use /sign_up to create one.")
    );
}

#[tokio::test]
async fn bogus_refund_is_refused_and_not_counted() {
    let h = harness().await;
    assert_eq!(
        h.say(1, "/refund bogus-charge-id").await.as_deref(),
        Some("❌ Refund could not be processed.\nPlease try again later or contact support.")
    );
    assert_eq!(h.payments.stats().refunds(1), 0);

    let usage = h.say(1, "/refund").await.unwrap();
    assert!(usage.starts_with("Please provide the transaction ID"));
}

#[tokio::test]
async fn find_team_offers_purchase_then_runs_for_subscribers() {
    let h = harness().await;
    h.repo.create(1, Some("Ann"), Some("ann")).await.unwrap();
    h.repo.create(2, Some("Bob"), Some("bob")).await.unwrap();
    h.repo.create(3, Some("Cid"), None).await.unwrap();
    h.say(1, "/set_skills").await;
    h.say(1, "Rust, Go").await;
    h.say(2, "/set_skills").await;
    h.say(2, "Python, Rust").await;
    h.say(3, "/set_skills").await;
    h.say(3, "Java").await;

    let offer = h.bot.handle(&text(1, "/find_team")).await.unwrap();
    let data: Vec<&str> = offer.buttons.iter().map(|b| b.data.as_str()).collect();
    assert_eq!(data, vec!["find_team", "vip"]);
    assert!(h.sessions.get(1).await.is_none());

    h.gate.grant_subscription(1).await.unwrap();
    assert_eq!(
        h.say(1, "/find_team").await.as_deref(),
        Some(
            "Please describe what kind of team members you're looking for. \
             Include skills and any other requirements."
        )
    );

    let report = h.say(1, "need rust people").await.unwrap();
    assert!(report.starts_with("🔍 Found 1 potential team members:"));
    assert!(report.contains("1. Bob (@bob)"));
    assert!(!report.contains("Cid"));
    assert!(h.sessions.get(1).await.is_none());
}

#[tokio::test]
async fn find_team_purchase_opens_requirements_step() {
    let h = harness().await;
    h.repo.create(1, Some("Ann"), None).await.unwrap();

    let callback = IncomingMessage::new(
        "recording",
        1,
        MessageKind::Callback {
            query_id: "cb1".into(),
            data: "find_team".into(),
        },
    )
    .with_metadata(serde_json::json!({"chat_id": "1"}));
    assert!(h.bot.handle(&callback).await.is_none());
    assert_eq!(
        h.channel.invoices.lock().unwrap().as_slice(),
        &[("1".to_string(), CatalogItem::FindTeam)]
    );

    let pre = IncomingMessage::new(
        "recording",
        1,
        MessageKind::PreCheckout {
            query_id: "pq1".into(),
            payload: "find_team".into(),
        },
    );
    assert!(h.bot.handle(&pre).await.is_none());

    let paid = IncomingMessage::new(
        "recording",
        1,
        MessageKind::PaymentSucceeded {
            payload: "find_team".into(),
            charge_id: "ch_1".into(),
        },
    );
    let thanks = h.bot.handle(&paid).await.unwrap().content;
    assert!(thanks.starts_with("Thank you for your purchase! 🎉"));

    let session = h.sessions.get(1).await.unwrap();
    assert_eq!(session.kind, FlowKind::TeamFind);
    assert_eq!(session.state, FlowState::AwaitingRequirements);
    assert_eq!(h.payments.stats().purchases(1), 1);
}

#[tokio::test]
async fn new_command_replaces_open_flow() {
    let h = harness().await;
    h.repo.create(1, Some("Ann"), None).await.unwrap();

    h.say(1, "/set_skills").await;
    h.say(1, "/add_project").await;
    assert_eq!(
        h.say(1, "Rust").await.as_deref(),
        Some("✅ Project added to your portfolio!")
    );
    let user = h.repo.get(1).await.unwrap();
    assert_eq!(user.portfolio.as_deref(), Some("Rust"));
    assert!(user.skills.is_none());

    h.say(1, "/set_skills").await;
    assert_eq!(
        h.say(1, "/cancel").await.as_deref(),
        Some("❌ Skill update cancelled.")
    );
    assert_eq!(h.say(1, "/cancel").await, None);
    assert_eq!(h.say(1, "Go").await, None);
}

#[tokio::test]
async fn unknown_command_is_ignored_and_keeps_flow() {
    let h = harness().await;
    h.say(1, "/set_skills").await;
    assert_eq!(h.say(1, "/dance").await, None);
    assert_eq!(h.sessions.get(1).await.unwrap().kind, FlowKind::Skills);
}

#[tokio::test]
async fn run_handles_each_users_events_in_order() {
    let h = harness().await;
    h.repo.create(1, Some("Ann"), None).await.unwrap();
    h.repo.create(2, Some("Bob"), None).await.unwrap();

    let events = vec![
        text(1, "/set_skills"),
        text(2, "/set_preferences"),
        text(1, "Rust, Go"),
        text(2, "remote only"),
        text(1, "/profile"),
        text(2, "/profile"),
    ];
    *h.channel.inbound.lock().unwrap() = events;

    timeout(TEST_TIMEOUT, h.bot.clone().run())
        .await
        .expect("bot run timed out")
        .unwrap();

    let ann = h.channel.replies_to(1);
    assert_eq!(ann.len(), 3);
    assert_eq!(ann[1], "✅ Skills updated.");
    assert!(ann[2].contains("Rust, Go"));

    let bob = h.channel.replies_to(2);
    assert_eq!(bob.len(), 3);
    assert_eq!(bob[1], "✅ Preferences updated.");
    assert!(bob[2].contains("remote only"));
}

#[tokio::test]
async fn callbacks_are_acknowledged() {
    let h = harness().await;
    let callback = IncomingMessage::new(
        "recording",
        1,
        MessageKind::Callback {
            query_id: "cb1".into(),
            data: "premium".into(),
        },
    );
    h.bot.process(callback).await;
    assert_eq!(*h.channel.acknowledged.lock().unwrap(), 1);
    assert_eq!(
        h.channel.replies_to(1),
        vec!["Sorry, something went wrong while processing your request.".to_string()]
    );
    assert!(h.channel.invoices.lock().unwrap().is_empty());
}
