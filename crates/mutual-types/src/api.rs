use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MatchPair, PresetAggregate, SentMessage};

// -- JWT Claims --

/// Claims carried by user bearer tokens. The token is issued elsewhere;
/// this server only needs `sub` as the caller's opaque user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub expiry_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: SentMessage,
    pub matches: Vec<MatchSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckMatchRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CheckMatchResponse {
    pub matched: bool,
    pub matches: Vec<MatchSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelMessagesRequest {
    pub ids: IdList,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub affected: usize,
    /// Ids left untouched because they are already matched.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_matched: Vec<Uuid>,
}

/// A received message as its receiver sees it: the sender stays anonymous.
#[derive(Debug, Serialize)]
pub struct InboxMessage {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<SentMessage> for InboxMessage {
    fn from(m: SentMessage) -> Self {
        Self {
            id: m.id,
            text: m.text,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub matched: bool,
}

// -- Matches --

/// A match from one participant's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: Uuid,
    pub matched_user_id: Uuid,
    pub text: String,
    pub matched_at: DateTime<Utc>,
}

impl MatchSummary {
    pub fn for_participant(pair: &MatchPair, user_id: Uuid) -> Self {
        Self {
            match_id: pair.id,
            matched_user_id: pair.other_participant(user_id),
            text: pair.text.clone(),
            matched_at: pair.matched_at,
        }
    }
}

// -- Presets --

#[derive(Debug, Serialize)]
pub struct PresetResponse {
    pub text: String,
    pub total_send_count: i64,
    pub distinct_sender_count: i64,
    pub last_sent_at: DateTime<Utc>,
    pub link_title: Option<String>,
    pub link_image: Option<String>,
}

impl From<PresetAggregate> for PresetResponse {
    fn from(p: PresetAggregate) -> Self {
        Self {
            text: p.text,
            total_send_count: p.total_send_count,
            distinct_sender_count: p.distinct_sender_count,
            last_sent_at: p.last_sent_at,
            link_title: p.link_title,
            link_image: p.link_image,
        }
    }
}

// -- Push subscriptions --

#[derive(Debug, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribePushRequest {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnsubscribePushRequest {
    pub endpoint: String,
}

// -- Admin --

/// Admin bodies accept a single id or an array of ids.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdList {
    One(Uuid),
    Many(Vec<Uuid>),
}

impl IdList {
    /// Normalise to a de-duplicated list, preserving first occurrence order.
    pub fn into_vec(self) -> Vec<Uuid> {
        match self {
            Self::One(id) => vec![id],
            Self::Many(ids) => {
                let mut seen = HashSet::with_capacity(ids.len());
                ids.into_iter().filter(|id| seen.insert(*id)).collect()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminIdsRequest {
    pub ids: IdList,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HideMatchingRequest {
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HideMatchingResponse {
    pub affected_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AdminSearchQuery {
    #[serde(default)]
    pub q: String,
    pub user_id: Option<Uuid>,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

fn default_search_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresetPreviewRequest {
    pub text: String,
    pub link_title: Option<String>,
    pub link_image: Option<String>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_list_accepts_single_id_or_array() {
        let id = Uuid::new_v4();
        let one: AdminIdsRequest =
            serde_json::from_value(serde_json::json!({ "ids": id })).unwrap();
        assert_eq!(one.ids.into_vec(), vec![id]);

        let other = Uuid::new_v4();
        let many: AdminIdsRequest =
            serde_json::from_value(serde_json::json!({ "ids": [id, other, id] })).unwrap();
        assert_eq!(many.ids.into_vec(), vec![id, other]);
    }

    #[test]
    fn large_id_lists_keep_first_occurrence_order() {
        let ids: Vec<Uuid> = (0..5000).map(|_| Uuid::new_v4()).collect();
        let doubled: Vec<Uuid> = ids.iter().chain(ids.iter().rev()).copied().collect();
        assert_eq!(IdList::Many(doubled).into_vec(), ids);
    }

    #[test]
    fn id_list_rejects_non_uuid() {
        let bad = serde_json::from_value::<AdminIdsRequest>(serde_json::json!({ "ids": 42 }));
        assert!(bad.is_err());
    }
}
