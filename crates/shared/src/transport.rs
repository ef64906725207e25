use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Outbound message for the messaging channel: plain text with optional
/// quick-reply actions rendered under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub quick_replies: Vec<QuickReplyAction>,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quick_replies: Vec::new(),
        }
    }

    pub fn with_quick_replies(
        text: impl Into<String>,
        quick_replies: Vec<QuickReplyAction>,
    ) -> Self {
        Self {
            text: text.into(),
            quick_replies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickReplyAction {
    /// Sends `text` back into the conversation when tapped.
    Text { label: String, text: String },
    /// Posts an opaque `key=value` payload back to the bot.
    Postback { label: String, data: String },
    /// Opens the platform date/datetime picker; the picked value arrives in
    /// the postback parameter map.
    Picker {
        label: String,
        data: String,
        mode: PickerMode,
    },
}

impl QuickReplyAction {
    pub fn text(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            label: label.into(),
            text: text.into(),
        }
    }

    pub fn postback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Postback {
            label: label.into(),
            data: data.into(),
        }
    }

    pub fn picker(label: impl Into<String>, data: impl Into<String>, mode: PickerMode) -> Self {
        Self::Picker {
            label: label.into(),
            data: data.into(),
            mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerMode {
    Date,
    DateTime,
}

impl PickerMode {
    fn wire_value(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::DateTime => "datetime",
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("messaging request failed: {0}")]
    Network(String),
    #[error("messaging api responded with status {status}: {message}")]
    Status { status: u16, message: String },
}

#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Replies within the inbound delivery identified by `reply_token`.
    async fn reply(&self, reply_token: &str, messages: &[Message]) -> Result<(), TransportError>;

    /// Pushes messages to a user outside any inbound delivery.
    async fn push(&self, user_id: &str, messages: &[Message]) -> Result<(), TransportError>;
}

/// HTTP client for the messaging channel's reply/push endpoints.
#[derive(Clone)]
pub struct MessagingClient {
    client: reqwest::Client,
    base_url: String,
    channel_access_token: String,
}

#[derive(Serialize)]
struct ReplyRequest<'a> {
    #[serde(rename = "replyToken")]
    reply_token: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
    #[serde(rename = "quickReply", skip_serializing_if = "Option::is_none")]
    quick_reply: Option<WireQuickReply>,
}

#[derive(Serialize)]
struct WireQuickReply {
    items: Vec<WireQuickReplyItem>,
}

#[derive(Serialize)]
struct WireQuickReplyItem {
    #[serde(rename = "type")]
    kind: &'static str,
    action: serde_json::Value,
}

impl MessagingClient {
    pub fn new(base_url: impl Into<String>, channel_access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            channel_access_token: channel_access_token.into(),
        }
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<(), TransportError> {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.channel_access_token)
            .json(body)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MessagingTransport for MessagingClient {
    async fn reply(&self, reply_token: &str, messages: &[Message]) -> Result<(), TransportError> {
        if messages.is_empty() {
            return Ok(());
        }

        let request = ReplyRequest {
            reply_token,
            messages: messages.iter().map(wire_message).collect(),
        };
        self.post_json("/v2/bot/message/reply", &request).await
    }

    async fn push(&self, user_id: &str, messages: &[Message]) -> Result<(), TransportError> {
        if messages.is_empty() {
            return Ok(());
        }

        let request = PushRequest {
            to: user_id,
            messages: messages.iter().map(wire_message).collect(),
        };
        self.post_json("/v2/bot/message/push", &request).await
    }
}

fn wire_message(message: &Message) -> WireMessage<'_> {
    let quick_reply = if message.quick_replies.is_empty() {
        None
    } else {
        Some(WireQuickReply {
            items: message
                .quick_replies
                .iter()
                .map(|action| WireQuickReplyItem {
                    kind: "action",
                    action: wire_action(action),
                })
                .collect(),
        })
    };

    WireMessage {
        kind: "text",
        text: &message.text,
        quick_reply,
    }
}

fn wire_action(action: &QuickReplyAction) -> serde_json::Value {
    match action {
        QuickReplyAction::Text { label, text } => serde_json::json!({
            "type": "message",
            "label": label,
            "text": text,
        }),
        QuickReplyAction::Postback { label, data } => serde_json::json!({
            "type": "postback",
            "label": label,
            "data": data,
        }),
        QuickReplyAction::Picker { label, data, mode } => serde_json::json!({
            "type": "datetimepicker",
            "label": label,
            "data": data,
            "mode": mode.wire_value(),
        }),
    }
}
