use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use mutual_api::state::{AppState, AppStateInner};
use mutual_db::{Database, MatchPolicy};
use mutual_gateway::dispatcher::Dispatcher;
use mutual_gateway::notifier::{DeliveryResult, Notifier, PushTransport};
use mutual_types::api::Claims;
use mutual_types::events::PushPayload;
use mutual_types::filter::KeywordFilter;
use mutual_types::models::PushSubscription;

const JWT_SECRET: &str = "test-jwt-secret";
const ADMIN_TOKEN: &str = "test-admin-token";

struct NullPush;

#[async_trait]
impl PushTransport for NullPush {
    async fn send(&self, _: &PushSubscription, _: &PushPayload) -> DeliveryResult {
        DeliveryResult::Ok
    }
}

fn app() -> Router {
    app_with_db().0
}

fn app_with_db() -> (Router, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let notifier = Notifier::new(
        db.clone(),
        Arc::new(NullPush),
        Arc::new(Dispatcher::new()),
        Duration::from_secs(1),
    );
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        notifier,
        filter: KeywordFilter::from_csv("spam"),
        match_policy: MatchPolicy::default(),
        jwt_secret: JWT_SECRET.into(),
        admin_token: ADMIN_TOKEN.into(),
    });
    (mutual_api::router(state), db)
}

fn token_for(user_id: Uuid) -> String {
    let exp = (chrono::Utc::now() + chrono::TimeDelta::hours(1)).timestamp() as usize;
    encode(
        &Header::default(),
        &Claims { sub: user_id, exp },
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn call(app: &Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn send(app: &Router, from: Uuid, to: Uuid, text: &str) -> (StatusCode, Value) {
    call(
        app,
        Method::POST,
        "/messages",
        Some(&token_for(from)),
        Some(json!({ "receiver_id": to, "text": text })),
    )
    .await
}

#[tokio::test]
async fn health_needs_no_auth() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn user_routes_reject_missing_or_bad_tokens() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/messages/unmatched", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = call(&app, Method::GET, "/messages/unmatched", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reciprocal_send_creates_a_match() {
    let app = app();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let (status, body) = send(&app, alice, bob, "coffee?").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["matches"].as_array().unwrap().len(), 0);

    let (status, inbox) = call(&app, Method::GET, "/messages/unmatched", Some(&token_for(bob)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["text"], "coffee?");
    assert!(inbox[0].get("sender_id").is_none());

    let (_, unread) = call(&app, Method::GET, "/messages/unread-count", Some(&token_for(bob)), None).await;
    assert_eq!(unread["count"], 1);

    let (status, body) = send(&app, bob, alice, "coffee?").await;
    assert_eq!(status, StatusCode::CREATED);
    let matches = body["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["matched_user_id"], json!(alice));

    let (_, alice_matches) = call(&app, Method::GET, "/matches", Some(&token_for(alice)), None).await;
    assert_eq!(alice_matches.as_array().unwrap().len(), 1);
    assert_eq!(alice_matches[0]["matched_user_id"], json!(bob));

    let (_, unread) = call(&app, Method::GET, "/messages/unread-count", Some(&token_for(bob)), None).await;
    assert_eq!(unread["count"], 0);

    let (_, sent) = call(&app, Method::GET, "/messages/sent", Some(&token_for(alice)), None).await;
    assert_eq!(sent[0]["matched"], true);
}

#[tokio::test]
async fn check_match_reports_without_appending() {
    let app = app();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    send(&app, alice, bob, "hello").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/messages/check-match",
        Some(&token_for(bob)),
        Some(json!({ "text": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matched"], true);

    let (_, sent) = call(&app, Method::GET, "/messages/sent", Some(&token_for(bob)), None).await;
    assert!(sent.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn failed_send_stores_nothing() {
    let (app, db) = app_with_db();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    send(&app, alice, bob, "coffee?").await;

    db.with_conn(|conn| Ok(conn.execute_batch("DROP TABLE match_pairs")?)).unwrap();

    let (status, body) = send(&app, bob, alice, "coffee?").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal_error");

    let bob_rows: i64 = db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM sent_messages WHERE sender_id = ?1",
                [bob.to_string()],
                |r| r.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(bob_rows, 0);
    assert_eq!(db.get_aggregate("coffee?").unwrap().unwrap().total_send_count, 1);
}

#[tokio::test]
async fn send_validation_errors_are_bad_requests() {
    let app = app();
    let alice = Uuid::new_v4();

    let (status, body) = send(&app, alice, alice, "me").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = send(&app, alice, Uuid::new_v4(), "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, alice, Uuid::new_v4(), "buy SPAM now").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "content_rejected");

    let (status, body) = call(
        &app,
        Method::POST,
        "/messages",
        Some(&token_for(alice)),
        Some(json!({ "text": "no receiver" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn cancel_checks_ownership() {
    let app = app();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let (_, body) = send(&app, alice, bob, "one").await;
    let id = body["message"]["id"].clone();

    let (status, body) = call(
        &app,
        Method::POST,
        "/messages/cancel",
        Some(&token_for(bob)),
        Some(json!({ "ids": id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = call(
        &app,
        Method::POST,
        "/messages/cancel",
        Some(&token_for(alice)),
        Some(json!({ "ids": [id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], 1);

    let (status, _) = call(
        &app,
        Method::POST,
        "/messages/cancel",
        Some(&token_for(alice)),
        Some(json!({ "ids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_routes_require_the_admin_token() {
    let app = app();
    let user_token = token_for(Uuid::new_v4());

    let (status, _) = call(&app, Method::GET, "/admin/unmatched/search?q=x", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::GET, "/admin/unmatched/search?q=x", Some(&user_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, Method::GET, "/admin/unmatched/search?q=x", Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_id_lists_are_bad_requests() {
    let app = app();
    let ids: Vec<Uuid> = (0..1001).map(|_| Uuid::new_v4()).collect();

    let (status, body) = call(
        &app,
        Method::POST,
        "/messages/cancel",
        Some(&token_for(Uuid::new_v4())),
        Some(json!({ "ids": ids })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = call(&app, Method::POST, "/admin/unmatched/delete", Some(ADMIN_TOKEN), Some(json!({ "ids": ids }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_query_strings_use_the_error_body() {
    let app = app();

    let (status, body) = call(
        &app,
        Method::GET,
        "/admin/unmatched/search?q=x&user_id=not-a-uuid",
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].is_string());

    let (status, body) = call(&app, Method::GET, "/presets?limit=lots", Some(&token_for(Uuid::new_v4())), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn admin_moderation_statuses() {
    let app = app();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let (_, first) = send(&app, alice, bob, "pair").await;
    send(&app, bob, alice, "pair").await;
    let matched_id = first["message"]["id"].clone();

    let (status, body) = call(
        &app,
        Method::POST,
        "/admin/unmatched/delete",
        Some(ADMIN_TOKEN),
        Some(json!({ "ids": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = call(
        &app,
        Method::POST,
        "/admin/unmatched/hide",
        Some(ADMIN_TOKEN),
        Some(json!({ "ids": matched_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = call(
        &app,
        Method::POST,
        "/admin/matched/delete",
        Some(ADMIN_TOKEN),
        Some(json!({ "ids": [matched_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], 1);

    let (_, pairs) = call(&app, Method::GET, "/admin/matched/search?q=pair", Some(ADMIN_TOKEN), None).await;
    assert_eq!(pairs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn hide_and_unhide_round_through_admin() {
    let app = app();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let (_, body) = send(&app, alice, bob, "quiet please").await;
    let id = body["message"]["id"].clone();

    let (status, _) = call(
        &app,
        Method::POST,
        "/admin/unmatched/hide",
        Some(ADMIN_TOKEN),
        Some(json!({ "ids": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, inbox) = call(&app, Method::GET, "/messages/unmatched", Some(&token_for(bob)), None).await;
    assert!(inbox.as_array().unwrap().is_empty());

    let (_, found) = call(
        &app,
        Method::GET,
        &format!("/admin/unmatched/search?q=quiet&user_id={alice}"),
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(found[0]["is_hidden"], true);

    let (status, _) = call(&app, Method::POST, "/admin/unhide", Some(ADMIN_TOKEN), Some(json!({ "ids": id }))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, inbox) = call(&app, Method::GET, "/messages/unmatched", Some(&token_for(bob)), None).await;
    assert_eq!(inbox.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn hide_matching_falls_back_to_configured_keywords() {
    let app = app();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    send(&app, alice, bob, "free tickets").await;
    send(&app, alice, bob, "see you").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/admin/hide-matching",
        Some(ADMIN_TOKEN),
        Some(json!({ "keywords": ["TICKETS"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected_ids"].as_array().unwrap().len(), 1);

    // configured list is "spam"; nothing left to hide
    let (status, body) = call(&app, Method::POST, "/admin/hide-matching", Some(ADMIN_TOKEN), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["affected_ids"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn presets_list_and_preview() {
    let app = app();
    let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    send(&app, alice, bob, "good morning").await;
    send(&app, carol, bob, "good morning").await;
    send(&app, alice, carol, "night").await;

    let user = token_for(alice);
    let (status, presets) = call(&app, Method::GET, "/presets", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(presets[0]["text"], "good morning");
    assert_eq!(presets[0]["distinct_sender_count"], 2);

    let (status, preset) = call(
        &app,
        Method::PUT,
        "/admin/presets/preview",
        Some(ADMIN_TOKEN),
        Some(json!({ "text": "night", "link_title": "Night", "link_image": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preset["link_title"], "Night");

    let (status, _) = call(
        &app,
        Method::PUT,
        "/admin/presets/preview",
        Some(ADMIN_TOKEN),
        Some(json!({ "text": "never sent", "link_title": null, "link_image": null })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn push_subscriptions_are_owned_by_the_caller() {
    let app = app();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let endpoint = "https://push.example.net/abc";
    let sub = json!({ "endpoint": endpoint, "keys": { "p256dh": "k", "auth": "a" } });

    let (status, _) = call(&app, Method::POST, "/push/subscriptions", Some(&token_for(alice)), Some(sub)).await;
    assert_eq!(status, StatusCode::CREATED);

    let body = json!({ "endpoint": endpoint });
    let (status, _) = call(&app, Method::DELETE, "/push/subscriptions", Some(&token_for(bob)), Some(body.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::DELETE, "/push/subscriptions", Some(&token_for(alice)), Some(body)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let bad = json!({ "endpoint": "http://insecure", "keys": { "p256dh": "k", "auth": "a" } });
    let (status, _) = call(&app, Method::POST, "/push/subscriptions", Some(&token_for(alice)), Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
