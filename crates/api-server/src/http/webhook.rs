use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use shared::dispatch::{InboundEvent, InboundKind};
use shared::intent::PostbackParams;
use tracing::{debug, warn};

use crate::signature::{WEBHOOK_SIGNATURE_HEADER, verify_webhook_signature};

use super::AppState;

#[derive(Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WebhookEvent {
    Message {
        #[serde(rename = "replyToken")]
        reply_token: String,
        source: EventSource,
        message: MessageContent,
    },
    Postback {
        #[serde(rename = "replyToken")]
        reply_token: String,
        source: EventSource,
        postback: PostbackContent,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize)]
struct EventSource {
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum MessageContent {
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize)]
struct PostbackContent {
    data: String,
    #[serde(default)]
    params: Option<PostbackParams>,
}

/// Webhook callback: the signature is checked over the raw body before any
/// parsing, then each delivery in the batch is dispatched independently.
pub(super) async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "missing signature").into_response();
    };

    if !verify_webhook_signature(&state.channel_secret, &body, signature) {
        warn!("webhook signature verification failed");
        return (StatusCode::BAD_REQUEST, "invalid signature").into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("failed to parse webhook payload: {err}");
            return (StatusCode::BAD_REQUEST, "invalid payload").into_response();
        }
    };

    let now = Utc::now();
    for event in payload.events {
        let Some(inbound) = inbound_event(event) else {
            debug!("skipping unsupported webhook event");
            continue;
        };
        state.dispatcher.handle_event(inbound, now).await;
    }

    (StatusCode::OK, "OK").into_response()
}

fn inbound_event(event: WebhookEvent) -> Option<InboundEvent> {
    match event {
        WebhookEvent::Message {
            reply_token,
            source,
            message: MessageContent::Text { text },
        } => Some(InboundEvent {
            user_id: source.user_id?,
            reply_token,
            kind: InboundKind::Text { text },
        }),
        WebhookEvent::Postback {
            reply_token,
            source,
            postback,
        } => Some(InboundEvent {
            user_id: source.user_id?,
            reply_token,
            kind: InboundKind::Postback {
                data: postback.data,
                params: postback.params.unwrap_or_default(),
            },
        }),
        _ => None,
    }
}
