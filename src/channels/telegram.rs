//! Telegram channel — long-polls the Bot API for updates.
//!
//! Also the payment provider: invoices, pre-checkout answers and refunds go
//! through the same Bot API client, priced in Telegram Stars.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{
    Channel, IncomingMessage, InlineButton, MessageKind, MessageStream, OutgoingResponse,
};
use crate::error::{ChannelError, PaymentError};
use crate::payments::{CURRENCY, CatalogItem, PaymentProvider};
use crate::profile::UserId;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Update types requested from `getUpdates`.
const ALLOWED_UPDATES: [&str; 3] = ["message", "callback_query", "pre_checkout_query"];

/// Back-off after a failed or rejected poll.
const POLL_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    provider_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            provider_token: String::new(),
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    /// Set the payment provider token (leave empty for Stars).
    pub fn with_provider_token(mut self, token: impl Into<String>) -> Self {
        self.provider_token = token.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// POST a Bot API method and return its `result`.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, String> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        let data: Value = resp.json().await.map_err(|e| e.to_string())?;
        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(format!("{method} failed ({status}): {description}"));
        }
        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Send a reply, splitting long messages; buttons go under the last chunk.
    async fn send_message(
        &self,
        chat_id: &str,
        response: &OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(&response.content, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last && !response.buttons.is_empty() {
                body["reply_markup"] = inline_keyboard(&response.buttons);
            }
            self.send_message_chunk(body, response.markdown).await?;
        }
        Ok(())
    }

    /// Send a single message chunk (≤4096 chars). Markdown content is tried
    /// with `parse_mode` first and retried as plain text.
    async fn send_message_chunk(&self, mut body: Value, markdown: bool) -> Result<(), ChannelError> {
        let mut markdown_err = None;
        if markdown {
            body["parse_mode"] = Value::String("Markdown".into());
            match self.call("sendMessage", &body).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Telegram sendMessage with Markdown failed; retrying without parse_mode"
                    );
                    markdown_err = Some(e);
                }
            }
            if let Some(obj) = body.as_object_mut() {
                obj.remove("parse_mode");
            }
        }

        self.call("sendMessage", &body)
            .await
            .map(|_| ())
            .map_err(|plain_err| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: match markdown_err {
                    Some(md) => format!("markdown: {md}; plain: {plain_err}"),
                    None => plain_err,
                },
            })
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ALLOWED_UPDATES,
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let results = match poll_results(&data) {
                    Ok(results) => results,
                    Err(description) => {
                        tracing::warn!("Telegram getUpdates rejected: {description}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update) else {
                        continue;
                    };

                    let user_id_str = incoming.user_id.to_string();
                    let mut identities = vec![user_id_str.as_str()];
                    if let Some(ref username) = incoming.username {
                        identities.push(username.as_str());
                    }
                    if !check_user_allowed(&allowed_users, identities) {
                        tracing::warn!(
                            "Telegram: ignoring update from unauthorized user: \
                             username={}, user_id={}",
                            incoming.username.as_deref().unwrap_or("unknown"),
                            incoming.user_id
                        );
                        continue;
                    }

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg.chat_id().ok_or_else(|| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: "No chat_id in message metadata".into(),
        })?;

        self.send_message(chat_id, &response).await
    }

    async fn acknowledge(&self, msg: &IncomingMessage) -> Result<(), ChannelError> {
        let MessageKind::Callback { ref query_id, .. } = msg.kind else {
            return Ok(());
        };
        self.call(
            "answerCallbackQuery",
            &serde_json::json!({ "callback_query_id": query_id }),
        )
        .await
        .map(|_| ())
        .map_err(|reason| ChannelError::SendFailed {
            name: "telegram".into(),
            reason,
        })
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Payments ────────────────────────────────────────────────────────

#[async_trait]
impl PaymentProvider for TelegramChannel {
    async fn send_invoice(&self, chat_id: &str, item: CatalogItem) -> Result<(), PaymentError> {
        self.call("sendInvoice", &invoice_body(chat_id, item, &self.provider_token))
            .await
            .map(|_| ())
            .map_err(PaymentError::Provider)
    }

    async fn answer_pre_checkout(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<&str>,
    ) -> Result<(), PaymentError> {
        let mut body = serde_json::json!({
            "pre_checkout_query_id": query_id,
            "ok": ok,
        });
        if let Some(message) = error_message {
            body["error_message"] = Value::String(message.to_string());
        }
        self.call("answerPreCheckoutQuery", &body)
            .await
            .map(|_| ())
            .map_err(PaymentError::Provider)
    }

    async fn refund(&self, user_id: UserId, charge_id: &str) -> Result<(), PaymentError> {
        let body = serde_json::json!({
            "user_id": user_id,
            "telegram_payment_charge_id": charge_id,
        });
        match self.call("refundStarPayment", &body).await {
            Ok(Value::Bool(true)) => Ok(()),
            Ok(_) => Err(PaymentError::Declined),
            Err(e) => Err(PaymentError::Provider(e)),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!("https://api.telegram.org/bot{}/{method}", token.expose_secret())
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// The updates in a `getUpdates` reply, or the API's error description.
///
/// A rejected poll (`ok: false`, e.g. a bad token or a second poller) has no
/// `result` array.
fn poll_results(data: &Value) -> Result<&[Value], String> {
    match data.get("result").and_then(Value::as_array) {
        Some(results) if data.get("ok").and_then(Value::as_bool) != Some(false) => Ok(results.as_slice()),
        _ => Err(data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("no description")
            .to_string()),
    }
}

fn inline_keyboard(buttons: &[InlineButton]) -> Value {
    let rows: Vec<Value> = buttons
        .iter()
        .map(|b| serde_json::json!([{ "text": b.label, "callback_data": b.data }]))
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

fn invoice_body(chat_id: &str, item: CatalogItem, provider_token: &str) -> Value {
    serde_json::json!({
        "chat_id": chat_id,
        "title": item.title(),
        "description": item.description(),
        "payload": item.id(),
        "provider_token": provider_token,
        "currency": CURRENCY,
        "prices": [{ "label": item.title(), "amount": item.price() }],
        "start_parameter": "start_parameter",
    })
}

/// Turn one `getUpdates` entry into an inbound event.
///
/// Returns `None` for update types the bot does not handle.
fn parse_update(update: &Value) -> Option<IncomingMessage> {
    if let Some(message) = update.get("message") {
        let from = message.get("from")?;
        let kind = if let Some(payment) = message.get("successful_payment") {
            MessageKind::PaymentSucceeded {
                payload: str_field(payment, "invoice_payload")?,
                charge_id: str_field(payment, "telegram_payment_charge_id")?,
            }
        } else {
            MessageKind::Text(str_field(message, "text")?)
        };
        let chat_id = message.get("chat").and_then(|c| c.get("id")).and_then(Value::as_i64);
        return build_incoming(from, kind, chat_id);
    }

    if let Some(query) = update.get("callback_query") {
        let from = query.get("from")?;
        let kind = MessageKind::Callback {
            query_id: str_field(query, "id")?,
            data: str_field(query, "data")?,
        };
        let chat_id = query
            .get("message")
            .and_then(|m| m.get("chat"))
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64);
        return build_incoming(from, kind, chat_id);
    }

    if let Some(query) = update.get("pre_checkout_query") {
        let from = query.get("from")?;
        let kind = MessageKind::PreCheckout {
            query_id: str_field(query, "id")?,
            payload: str_field(query, "invoice_payload")?,
        };
        // Pre-checkout queries carry no chat; private chat id equals the user id.
        let chat_id = from.get("id").and_then(Value::as_i64);
        return build_incoming(from, kind, chat_id);
    }

    None
}

fn build_incoming(from: &Value, kind: MessageKind, chat_id: Option<i64>) -> Option<IncomingMessage> {
    let user_id = from.get("id").and_then(Value::as_i64)?;
    let username = from.get("username").and_then(Value::as_str);
    let first_name = from.get("first_name").and_then(Value::as_str);

    let mut incoming = IncomingMessage::new("telegram", user_id, kind).with_metadata(
        serde_json::json!({
            "chat_id": chat_id.map(|id| id.to_string()).unwrap_or_default(),
        }),
    );
    if let Some(username) = username {
        incoming = incoming.with_username(username);
    }
    if let Some(name) = first_name.or(username) {
        incoming = incoming.with_user_name(name);
    }
    Some(incoming)
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Never cut inside a multi-byte character.
        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        // Find a good split point
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
