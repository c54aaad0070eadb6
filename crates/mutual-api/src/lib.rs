pub mod admin;
pub mod error;
pub mod matches;
pub mod messages;
pub mod middleware;
pub mod presets;
pub mod push;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};

use crate::middleware::{require_admin, require_auth};
use crate::state::AppState;

/// All REST routes. The WebSocket gateway is mounted by the server binary.
pub fn router(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/messages", post(messages::send_message))
        .route("/messages/check-match", post(messages::check_match))
        .route("/messages/cancel", post(messages::cancel_messages))
        .route("/messages/unmatched", get(messages::list_unmatched))
        .route("/messages/unread-count", get(messages::unread_count))
        .route("/messages/sent", get(messages::list_sent))
        .route("/matches", get(matches::list_matches))
        .route("/presets", get(presets::list_presets))
        .route("/push/subscriptions", post(push::subscribe))
        .route("/push/subscriptions", delete(push::unsubscribe))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/admin/unmatched/delete", post(admin::delete_unmatched))
        .route("/admin/unmatched/hide", post(admin::hide_unmatched))
        .route("/admin/unhide", post(admin::unhide))
        .route("/admin/matched/delete", post(admin::delete_matched))
        .route("/admin/hide-matching", post(admin::hide_matching))
        .route("/admin/matched/search", get(admin::search_matched))
        .route("/admin/unmatched/search", get(admin::search_unmatched))
        .route("/admin/presets/preview", put(admin::set_preset_preview))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(user_routes)
        .merge(admin_routes)
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
