//! Bot dispatcher — routes inbound events to flows, the gate and payments.
//!
//! Events from one user are handled strictly in arrival order by a worker
//! task owned by that user. Different users never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bot::commands::{Command, CommandParser};
use crate::bot::replies;
use crate::channels::{Channel, IncomingMessage, MessageKind, OutgoingResponse};
use crate::conversation::ConversationEngine;
use crate::entitlement::{Access, Capability, EntitlementGate};
use crate::error::FlowError;
use crate::payments::PaymentCoordinator;
use crate::profile::UserId;
use crate::store::UserRepository;
use crate::summary::{ProfileSummarizer, refresh_about};

/// How often idle per-user workers are reaped.
const WORKER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared components the bot routes to.
pub struct BotDeps {
    pub repo: Arc<dyn UserRepository>,
    pub gate: Arc<EntitlementGate>,
    pub engine: Arc<ConversationEngine>,
    pub payments: Arc<PaymentCoordinator>,
    pub summarizer: Arc<dyn ProfileSummarizer>,
}

/// A user's inbound queue and the number of events not yet handled.
struct UserQueue {
    tx: mpsc::UnboundedSender<IncomingMessage>,
    pending: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

pub struct Bot {
    deps: BotDeps,
    channel: Arc<dyn Channel>,
}

impl Bot {
    pub fn new(deps: BotDeps, channel: Arc<dyn Channel>) -> Self {
        Self { deps, channel }
    }

    /// Run until Ctrl+C or until the channel stream ends.
    ///
    /// Events already queued are still handled before this returns.
    pub async fn run(self: Arc<Self>) -> crate::error::Result<()> {
        let mut stream = self.channel.start().await?;
        let mut queues: HashMap<UserId, UserQueue> = HashMap::new();

        let mut sweep = tokio::time::interval(WORKER_SWEEP_INTERVAL);
        sweep.tick().await;

        tracing::info!(channel = self.channel.name(), "Bot ready and listening");

        loop {
            tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                _ = sweep.tick() => {
                    let before = queues.len();
                    queues.retain(|_, q| q.pending.load(Ordering::SeqCst) > 0);
                    let reaped = before - queues.len();
                    if reaped > 0 {
                        tracing::debug!(reaped, "Reaped idle user workers");
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(m) => self.dispatch(&mut queues, m),
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            }
        }

        // Closing every sender lets each worker drain its queue and exit.
        let handles: Vec<JoinHandle<()>> = queues.into_values().map(|q| q.handle).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "User worker panicked");
            }
        }

        self.channel.shutdown().await?;
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, queues: &mut HashMap<UserId, UserQueue>, msg: IncomingMessage) {
        let user_id = msg.user_id;
        let rejected = {
            let queue = queues
                .entry(user_id)
                .or_insert_with(|| self.spawn_worker(user_id));
            queue.pending.fetch_add(1, Ordering::SeqCst);
            queue.tx.send(msg).err()
        };

        // The worker died; start a fresh one and hand it the event.
        if let Some(mpsc::error::SendError(msg)) = rejected {
            tracing::warn!(user_id, "User worker gone, restarting");
            let queue = self.spawn_worker(user_id);
            queue.pending.fetch_add(1, Ordering::SeqCst);
            if queue.tx.send(msg).is_err() {
                tracing::error!(user_id, "Dropped event: user worker unavailable");
            }
            queues.insert(user_id, queue);
        }
    }

    fn spawn_worker(self: &Arc<Self>, user_id: UserId) -> UserQueue {
        let (tx, mut rx) = mpsc::unbounded_channel::<IncomingMessage>();
        let pending = Arc::new(AtomicUsize::new(0));
        let bot = Arc::clone(self);
        let counter = Arc::clone(&pending);
        let handle = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                bot.process(msg).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }
            tracing::debug!(user_id, "User worker stopped");
        });
        UserQueue {
            tx,
            pending,
            handle,
        }
    }

    /// Handle one event and send its reply, if any.
    pub async fn process(&self, msg: IncomingMessage) {
        if matches!(msg.kind, MessageKind::Callback { .. }) {
            if let Err(e) = self.channel.acknowledge(&msg).await {
                tracing::warn!(user_id = msg.user_id, error = %e, "Failed to acknowledge callback");
            }
        }

        if let Some(response) = self.handle(&msg).await {
            if let Err(e) = self.channel.respond(&msg, response).await {
                tracing::error!(user_id = msg.user_id, error = %e, "Failed to send reply");
            }
        }
    }

    /// Compute the reply to one event. `None` means stay silent.
    pub async fn handle(&self, msg: &IncomingMessage) -> Option<OutgoingResponse> {
        let user_id = msg.user_id;
        match &msg.kind {
            MessageKind::Text(text) => self.handle_text(msg, text).await,
            MessageKind::Callback { data, .. } => {
                let chat_id = msg
                    .chat_id()
                    .map(String::from)
                    .unwrap_or_else(|| user_id.to_string());
                match self.deps.payments.offer(user_id, &chat_id, data).await {
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(user_id, data = %data, error = %e, "Offer failed");
                        Some(OutgoingResponse::text(replies::INVOICE_FAILED))
                    }
                }
            }
            MessageKind::PreCheckout { query_id, payload } => {
                if let Err(e) = self
                    .deps
                    .payments
                    .pre_checkout(user_id, query_id, payload)
                    .await
                {
                    tracing::error!(user_id, error = %e, "Failed to answer pre-checkout");
                }
                None
            }
            MessageKind::PaymentSucceeded { payload, charge_id } => {
                let reply = match self.deps.payments.confirm(user_id, payload, charge_id).await {
                    Ok(done) => replies::fulfilment(&done),
                    Err(e) => e.user_message(),
                };
                Some(OutgoingResponse::text(reply))
            }
        }
    }

    async fn handle_text(&self, msg: &IncomingMessage, text: &str) -> Option<OutgoingResponse> {
        let user_id = msg.user_id;
        let command = CommandParser::parse(text);
        tracing::debug!(user_id, ?command, "Command");

        let result = match command {
            Command::Start => return Some(OutgoingResponse::markdown(replies::WELCOME)),
            Command::Help => return Some(OutgoingResponse::text(replies::HELP)),
            Command::Shop => return Some(replies::shop()),
            Command::Cancel => return self.deps.engine.cancel(user_id).await.map(OutgoingResponse::text),
            Command::Unknown(name) => {
                tracing::debug!(user_id, name = %name, "Unknown command ignored");
                return None;
            }
            Command::SignUp => {
                self.deps
                    .engine
                    .start_registration(user_id, msg.user_name.as_deref(), msg.username.as_deref())
                    .await
            }
            Command::Modify => self.deps.engine.start_modify(user_id).await,
            Command::ModifyEmail => self.deps.engine.start_modify_email(user_id).await,
            Command::SetSkills => Ok(self.deps.engine.start_skills(user_id).await),
            Command::SetPreferences => Ok(self.deps.engine.start_preferences(user_id).await),
            Command::AddProject => Ok(self.deps.engine.start_portfolio(user_id).await),
            Command::Portfolio => self.portfolio(user_id).await,
            Command::Profile => self.profile(user_id).await,
            Command::Refund { charge_id } => self.refund(user_id, charge_id.as_deref()).await,
            Command::AboutMe => return self.gated(user_id, Capability::AboutMe).await,
            Command::FindTeam => return self.gated(user_id, Capability::FindTeam).await,
            Command::Text(text) => match self.deps.engine.handle_text(user_id, &text).await {
                Ok(reply) => return reply.map(OutgoingResponse::text),
                Err(e) => Err(e),
            },
        };

        Some(OutgoingResponse::text(self.reply_or_error(user_id, result)))
    }

    fn reply_or_error(&self, user_id: UserId, result: Result<String, FlowError>) -> String {
        result.unwrap_or_else(|e| {
            if e.is_retryable() {
                tracing::debug!(user_id, error = %e, "Input rejected");
            } else {
                tracing::warn!(user_id, error = %e, "Command failed");
            }
            e.user_message()
        })
    }

    async fn portfolio(&self, user_id: UserId) -> Result<String, FlowError> {
        let user = self.deps.repo.get(user_id).await?;
        Ok(match user.portfolio.as_deref().map(str::trim) {
            Some(projects) if !projects.is_empty() => replies::portfolio(projects),
            _ => replies::PORTFOLIO_EMPTY.to_string(),
        })
    }

    async fn profile(&self, user_id: UserId) -> Result<String, FlowError> {
        let user = self.deps.repo.get(user_id).await?;
        Ok(user.render_profile(self.deps.gate.now()))
    }

    async fn refund(&self, user_id: UserId, charge_id: Option<&str>) -> Result<String, FlowError> {
        let Some(charge_id) = charge_id else {
            return Ok(replies::REFUND_USAGE.to_string());
        };
        Ok(match self.deps.payments.refund(user_id, charge_id).await {
            Ok(()) => replies::REFUND_SUCCESS.to_string(),
            Err(_) => replies::REFUND_FAILED.to_string(),
        })
    }

    /// Run a paid capability for subscribers, otherwise offer a purchase.
    async fn gated(&self, user_id: UserId, capability: Capability) -> Option<OutgoingResponse> {
        let access = match self.deps.gate.check(user_id, capability).await {
            Ok(access) => access,
            Err(e) => {
                let e = FlowError::from(e);
                return Some(OutgoingResponse::text(self.reply_or_error(user_id, Err(e))));
            }
        };

        match access {
            Access::RequiresPurchase(items) => Some(replies::offer(&items)),
            Access::Entitled => {
                let result = match capability {
                    Capability::AboutMe => refresh_about(
                        self.deps.repo.as_ref(),
                        self.deps.summarizer.as_ref(),
                        user_id,
                    )
                    .await
                    .map(|_| replies::SUMMARY_CREATED.to_string()),
                    Capability::FindTeam => Ok(self.deps.engine.start_team_find(user_id).await),
                };
                Some(OutgoingResponse::text(self.reply_or_error(user_id, result)))
            }
        }
    }
}
