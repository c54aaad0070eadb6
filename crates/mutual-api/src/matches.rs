use axum::{Extension, Json, extract::State};

use mutual_types::api::{Claims, MatchSummary};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /matches: the caller's matches, each showing the other participant.
pub async fn list_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MatchSummary>>, ApiError> {
    let user_id = claims.sub;
    let pairs = state.run_db(move |db| db.list_matches_for_user(user_id)).await?;
    Ok(Json(
        pairs
            .iter()
            .map(|p| MatchSummary::for_participant(p, user_id))
            .collect(),
    ))
}
