//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;
use crate::profile::UserId;

/// Stream of inbound events from a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// What the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// A text message, commands included.
    Text(String),
    /// An inline button was pressed.
    Callback { query_id: String, data: String },
    /// The provider asks whether checkout may proceed.
    PreCheckout { query_id: String, payload: String },
    /// The provider reports a completed charge.
    PaymentSucceeded { payload: String, charge_id: String },
}

/// An inbound event from a user.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel it arrived on.
    pub channel: String,
    pub user_id: UserId,
    /// Display name (first name on Telegram).
    pub user_name: Option<String>,
    /// Handle without the `@`.
    pub username: Option<String>,
    pub kind: MessageKind,
    /// Channel-specific routing data, such as `chat_id`.
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: impl Into<String>, user_id: UserId, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user_id,
            user_name: None,
            username: None,
            kind,
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn text(channel: impl Into<String>, user_id: UserId, text: impl Into<String>) -> Self {
        Self::new(channel, user_id, MessageKind::Text(text.into()))
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Chat to reply into, if the channel recorded one.
    pub fn chat_id(&self) -> Option<&str> {
        self.metadata.get("chat_id").and_then(|v| v.as_str())
    }
}

/// An inline button under a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    /// Sent back as the callback data when pressed.
    pub data: String,
}

/// A reply to send back to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
    /// One button per row.
    pub buttons: Vec<InlineButton>,
    /// Content uses Markdown formatting.
    pub markdown: bool,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            buttons: Vec::new(),
            markdown: false,
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            markdown: true,
            ..Self::text(content)
        }
    }

    pub fn with_button(mut self, label: impl Into<String>, data: impl Into<String>) -> Self {
        self.buttons.push(InlineButton {
            label: label.into(),
            data: data.into(),
        });
        self
    }
}

/// A transport the bot talks to users through.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving. Events arrive on the returned stream until shutdown.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Reply in the conversation `msg` came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Acknowledge an interactive event (e.g. stop a button's spinner).
    async fn acknowledge(&self, _msg: &IncomingMessage) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
