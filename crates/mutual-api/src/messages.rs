use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use mutual_db::NewMessage;
use mutual_types::api::{
    CancelMessagesRequest, CheckMatchRequest, CheckMatchResponse, Claims, InboxMessage, MatchSummary,
    MutationResponse, OutboxMessage, SendMessageRequest, SendMessageResponse, UnreadCountResponse,
};

use crate::error::{ApiError, ApiJson};
use crate::state::AppState;

/// POST /messages: append to the ledger and run match detection for the
/// sender in one transaction. Notifications go out in the background once
/// it has committed.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender_id = claims.sub;
    let now = chrono::Utc::now();
    let policy = state.match_policy;
    let filter = state.filter.clone();

    let (message, pairs) = state
        .run_db(move |db| {
            let new = NewMessage {
                sender_id,
                receiver_id: req.receiver_id,
                text: &req.text,
                expiry_days: req.expiry_days,
            };
            db.append_and_check(new, now, &filter, policy)
        })
        .await?;

    let matches: Vec<MatchSummary> = pairs
        .iter()
        .map(|p| MatchSummary::for_participant(p, sender_id))
        .collect();
    state.notifier.spawn_for_send(Some(message.clone()), pairs);

    Ok((StatusCode::CREATED, Json(SendMessageResponse { message, matches })))
}

/// POST /messages/check-match: detection only, for clients that append and
/// check in two steps.
pub async fn check_match(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CheckMatchRequest>,
) -> Result<Json<CheckMatchResponse>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::Validation("text must not be empty".into()));
    }

    let sender_id = claims.sub;
    let now = chrono::Utc::now();
    let policy = state.match_policy;
    let pairs = state
        .run_db(move |db| db.check_match(sender_id, &req.text, now, policy))
        .await?;

    let matches: Vec<MatchSummary> = pairs
        .iter()
        .map(|p| MatchSummary::for_participant(p, sender_id))
        .collect();
    state.notifier.spawn_for_send(None, pairs);

    Ok(Json(CheckMatchResponse {
        matched: !matches.is_empty(),
        matches,
    }))
}

/// POST /messages/cancel: withdraw the caller's own unmatched messages.
pub async fn cancel_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CancelMessagesRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let ids = req.ids.into_vec();
    let user_id = claims.sub;
    let outcome = state.run_db(move |db| db.cancel(&ids, user_id)).await?;

    Ok(Json(MutationResponse {
        affected: outcome.affected.len(),
        skipped_matched: outcome.skipped_matched,
    }))
}

pub async fn list_unmatched(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<InboxMessage>>, ApiError> {
    let now = chrono::Utc::now();
    let rows = state
        .run_db(move |db| db.list_unmatched_for_receiver(claims.sub, now))
        .await?;
    Ok(Json(rows.into_iter().map(InboxMessage::from).collect()))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let now = chrono::Utc::now();
    let count = state
        .run_db(move |db| db.count_unmatched_for_receiver(claims.sub, now))
        .await?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn list_sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<OutboxMessage>>, ApiError> {
    let rows = state.run_db(move |db| db.list_sent_by(claims.sub)).await?;
    let sent = rows
        .into_iter()
        .map(|(m, matched)| OutboxMessage {
            id: m.id,
            receiver_id: m.receiver_id,
            text: m.text,
            created_at: m.created_at,
            expires_at: m.expires_at,
            matched,
        })
        .collect();
    Ok(Json(sent))
}
