use axum::{Json, extract::State};

use mutual_types::api::{
    AdminIdsRequest, AdminSearchQuery, HideMatchingRequest, HideMatchingResponse, MutationResponse,
    PresetPreviewRequest, PresetResponse,
};
use mutual_types::models::{MatchPair, SentMessage};

use crate::error::{ApiError, ApiJson, ApiQuery};
use crate::state::AppState;

const MAX_SEARCH_LIMIT: u32 = 500;

fn mutation_response(outcome: mutual_db::MutationOutcome) -> Json<MutationResponse> {
    Json(MutationResponse {
        affected: outcome.affected.len(),
        skipped_matched: outcome.skipped_matched,
    })
}

/// POST /admin/unmatched/delete
pub async fn delete_unmatched(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AdminIdsRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let ids = req.ids.into_vec();
    let outcome = state.run_db(move |db| db.delete_unmatched(&ids)).await?;
    Ok(mutation_response(outcome))
}

/// POST /admin/unmatched/hide
pub async fn hide_unmatched(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AdminIdsRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let ids = req.ids.into_vec();
    let outcome = state.run_db(move |db| db.hide(&ids)).await?;
    Ok(mutation_response(outcome))
}

/// POST /admin/unhide
pub async fn unhide(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AdminIdsRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let ids = req.ids.into_vec();
    let outcome = state.run_db(move |db| db.unhide(&ids)).await?;
    Ok(mutation_response(outcome))
}

/// POST /admin/matched/delete: removes ledger rows even when matched.
/// Existing MatchPairs are kept.
pub async fn delete_matched(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AdminIdsRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let ids = req.ids.into_vec();
    let outcome = state.run_db(move |db| db.delete_including_matched(&ids)).await?;
    Ok(mutation_response(outcome))
}

/// POST /admin/hide-matching: sweep the ledger with the given keywords, or
/// with the configured banned list when none are given.
pub async fn hide_matching(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<HideMatchingRequest>,
) -> Result<Json<HideMatchingResponse>, ApiError> {
    let keywords = if req.keywords.is_empty() {
        state.filter.keywords().to_vec()
    } else {
        req.keywords
    };
    let affected_ids = state.run_db(move |db| db.hide_all_matching(&keywords)).await?;
    Ok(Json(HideMatchingResponse { affected_ids }))
}

/// GET /admin/matched/search?q=&user_id=
pub async fn search_matched(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AdminSearchQuery>,
) -> Result<Json<Vec<MatchPair>>, ApiError> {
    let limit = query.limit.min(MAX_SEARCH_LIMIT);
    let pairs = state
        .run_db(move |db| db.search_matched(&query.q, query.user_id, limit))
        .await?;
    Ok(Json(pairs))
}

/// GET /admin/unmatched/search?q=&user_id=. Hidden rows are included so
/// they can be reviewed and unhidden.
pub async fn search_unmatched(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AdminSearchQuery>,
) -> Result<Json<Vec<SentMessage>>, ApiError> {
    let limit = query.limit.min(MAX_SEARCH_LIMIT);
    let rows = state
        .run_db(move |db| db.search_unmatched(&query.q, query.user_id, limit))
        .await?;
    Ok(Json(rows))
}

/// PUT /admin/presets/preview
pub async fn set_preset_preview(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PresetPreviewRequest>,
) -> Result<Json<PresetResponse>, ApiError> {
    let preset = state
        .run_db(move |db| {
            db.set_preset_preview(req.text.trim(), req.link_title.as_deref(), req.link_image.as_deref())
        })
        .await?;
    Ok(Json(PresetResponse::from(preset)))
}
