mod config;
mod sweep;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use mutual_api::state::{AppState, AppStateInner};
use mutual_db::{Database, MatchPolicy};
use mutual_gateway::connection;
use mutual_gateway::dispatcher::Dispatcher;
use mutual_gateway::notifier::Notifier;
use mutual_gateway::webpush::HttpPushTransport;
use mutual_types::filter::KeywordFilter;

use crate::config::Config;

#[derive(Clone)]
struct GatewayState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mutual=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);

    let dispatcher = Dispatcher::new();
    let push = Arc::new(HttpPushTransport::new(config.push_timeout)?);
    let notifier = Notifier::new(db.clone(), push, Arc::new(dispatcher.clone()), config.push_timeout);

    let filter = KeywordFilter::from_csv(&config.banned_keywords);
    info!("Content filter loaded with {} keyword(s)", filter.keywords().len());

    tokio::spawn(sweep::run_sweep_loop(db.clone(), config.sweep_interval_secs));

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        notifier,
        filter,
        match_policy: MatchPolicy {
            allow_duplicate_matches: config.allow_duplicate_matches,
        },
        jwt_secret: config.jwt_secret.clone(),
        admin_token: config.admin_token.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(GatewayState {
            dispatcher,
            jwt_secret: config.jwt_secret.clone(),
        });

    let app = Router::new()
        .merge(mutual_api::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Mutual server listening on {}", addr);
    info!(
        "Duplicate matches {}",
        if config.allow_duplicate_matches { "allowed" } else { "suppressed" }
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// `?token=` authenticates at the upgrade; without it the client must send
/// Identify as its first frame.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match query.token {
        Some(token) => match connection::verify_token(&token, &state.jwt_secret) {
            Some(user_id) => ws
                .on_upgrade(move |socket| connection::handle_connection_authenticated(socket, state.dispatcher, user_id))
                .into_response(),
            None => StatusCode::UNAUTHORIZED.into_response(),
        },
        None => ws
            .on_upgrade(move |socket| connection::handle_connection(socket, state.dispatcher, state.jwt_secret))
            .into_response(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(_) => {
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
