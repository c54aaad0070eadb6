use axum::{Json, extract::State};
use serde::Deserialize;

use mutual_types::api::PresetResponse;

use crate::error::{ApiError, ApiQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PresetQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /presets: texts sent within the match window, most popular first.
pub async fn list_presets(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PresetQuery>,
) -> Result<Json<Vec<PresetResponse>>, ApiError> {
    let now = chrono::Utc::now();
    let limit = query.limit.min(200);
    let presets = state.run_db(move |db| db.list_live_presets(now, limit)).await?;
    Ok(Json(presets.into_iter().map(PresetResponse::from).collect()))
}
