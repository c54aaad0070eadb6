use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway. Every event is targeted at a
/// single user; nothing is broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// Someone sent the receiving user a message. The sender stays anonymous.
    NewMessage {
        message_id: Uuid,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// The receiving user matched with `matched_user_id`.
    MatchCreated {
        match_id: Uuid,
        matched_user_id: Uuid,
        text: String,
        timestamp: DateTime<Utc>,
    },
}

impl GatewayEvent {
    /// Push notification rendering of this event, if it warrants one.
    pub fn push_payload(&self) -> Option<PushPayload> {
        match self {
            Self::Ready { .. } => None,
            Self::NewMessage { text, .. } => Some(PushPayload {
                kind: "new_message".into(),
                title: "Someone sent you a message".into(),
                body: text.clone(),
                url: "/inbox".into(),
            }),
            Self::MatchCreated { match_id, text, .. } => Some(PushPayload {
                kind: "match".into(),
                title: "It's a match!".into(),
                body: text.clone(),
                url: format!("/chat/{}", match_id),
            }),
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },
}

/// Structured body delivered to each push endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    pub url: String,
}
