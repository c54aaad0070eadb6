use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One directed message in the ledger. A→B and B→A are always separate rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub is_hidden: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A mutual exchange of the same text. `user1_id` is the user whose send
/// triggered detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPair {
    pub id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub text: String,
    pub matched_at: DateTime<Utc>,
}

impl MatchPair {
    /// The participant that is not `user_id`.
    pub fn other_participant(&self, user_id: Uuid) -> Uuid {
        if self.user1_id == user_id {
            self.user2_id
        } else {
            self.user1_id
        }
    }
}

/// Per-text rollup. Always derived from the ledger, never a source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetAggregate {
    pub text: String,
    pub total_send_count: i64,
    pub distinct_sender_count: i64,
    pub last_sent_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub link_title: Option<String>,
    pub link_image: Option<String>,
}

/// A web push endpoint registered by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub is_active: bool,
}
