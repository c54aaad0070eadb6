use axum::{Extension, extract::State, http::StatusCode};

use mutual_types::api::{Claims, SubscribePushRequest, UnsubscribePushRequest};

use crate::error::{ApiError, ApiJson};
use crate::state::AppState;

/// POST /push/subscriptions: register (or revive) a web push endpoint.
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SubscribePushRequest>,
) -> Result<StatusCode, ApiError> {
    if !req.endpoint.starts_with("https://") {
        return Err(ApiError::Validation("endpoint must be an https URL".into()));
    }
    if req.keys.p256dh.is_empty() || req.keys.auth.is_empty() {
        return Err(ApiError::Validation("subscription keys are required".into()));
    }

    let now = chrono::Utc::now();
    state
        .run_db(move |db| db.upsert_push_subscription(claims.sub, &req.endpoint, &req.keys.p256dh, &req.keys.auth, now))
        .await?;
    Ok(StatusCode::CREATED)
}

/// DELETE /push/subscriptions
pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UnsubscribePushRequest>,
) -> Result<StatusCode, ApiError> {
    let removed = state
        .run_db(move |db| db.unsubscribe_push(claims.sub, &req.endpoint))
        .await?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
