//! Best-effort fan-out of user-targeted events to realtime connections and
//! web push endpoints.
//!
//! Nothing here reports failure to the caller: the triggering send or match
//! has already committed by the time a notification goes out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};
use uuid::Uuid;

use mutual_db::Database;
use mutual_types::api::MatchSummary;
use mutual_types::events::{GatewayEvent, PushPayload};
use mutual_types::models::{MatchPair, PushSubscription, SentMessage};

/// Outcome of one push delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Ok,
    /// The endpoint no longer exists (HTTP 404/410); it will never work again.
    Gone,
    TransientError(String),
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> DeliveryResult;
}

/// At-most-once, fire-and-forget delivery to a user's live connections.
#[async_trait]
pub trait RealtimeRelay: Send + Sync {
    async fn publish(&self, user_id: Uuid, event: GatewayEvent);
}

/// What happened to one notification. Only used for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub deactivated: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    push: Arc<dyn PushTransport>,
    realtime: Arc<dyn RealtimeRelay>,
    push_timeout: Duration,
}

impl Notifier {
    pub fn new(
        db: Arc<Database>,
        push: Arc<dyn PushTransport>,
        realtime: Arc<dyn RealtimeRelay>,
        push_timeout: Duration,
    ) -> Self {
        Self {
            db,
            push,
            realtime,
            push_timeout,
        }
    }

    /// Deliver `event` to `target_user_id` over every channel.
    pub async fn notify(&self, event: GatewayEvent, target_user_id: Uuid) -> NotifyReport {
        self.realtime.publish(target_user_id, event.clone()).await;

        let mut report = NotifyReport::default();
        let Some(payload) = event.push_payload() else {
            return report;
        };

        let db = self.db.clone();
        let subscriptions = match tokio::task::spawn_blocking(move || db.active_push_subscriptions(target_user_id)).await {
            Ok(Ok(subs)) => subs,
            Ok(Err(e)) => {
                error!("Failed to load push subscriptions for {}: {}", target_user_id, e);
                return report;
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                return report;
            }
        };

        for sub in &subscriptions {
            let result = match tokio::time::timeout(self.push_timeout, self.push.send(sub, &payload)).await {
                Ok(result) => result,
                Err(_) => DeliveryResult::TransientError(format!("timed out after {:?}", self.push_timeout)),
            };

            match result {
                DeliveryResult::Ok => report.delivered += 1,
                DeliveryResult::Gone => {
                    let db = self.db.clone();
                    let endpoint = sub.endpoint.clone();
                    match tokio::task::spawn_blocking(move || db.deactivate_push_endpoint(&endpoint)).await {
                        Ok(Ok(_)) => report.deactivated += 1,
                        Ok(Err(e)) => error!("Failed to deactivate push endpoint {}: {}", sub.endpoint, e),
                        Err(e) => error!("spawn_blocking join error: {}", e),
                    }
                }
                DeliveryResult::TransientError(reason) => {
                    warn!("Push to {} failed ({}), keeping endpoint", sub.endpoint, reason);
                    report.failed += 1;
                }
            }
        }

        debug!("Notified {}: {:?}", target_user_id, report);
        report
    }

    /// Tell both participants about a new match, each with the other's id.
    pub async fn notify_match(&self, pair: &MatchPair) {
        for user_id in [pair.user1_id, pair.user2_id] {
            let summary = MatchSummary::for_participant(pair, user_id);
            let event = GatewayEvent::MatchCreated {
                match_id: summary.match_id,
                matched_user_id: summary.matched_user_id,
                text: summary.text,
                timestamp: summary.matched_at,
            };
            self.notify(event, user_id).await;
        }
    }

    /// Tell the receiver a message arrived, without revealing the sender.
    pub async fn notify_new_message(&self, message: &SentMessage) {
        let event = GatewayEvent::NewMessage {
            message_id: message.id,
            text: message.text.clone(),
            timestamp: message.created_at,
        };
        self.notify(event, message.receiver_id).await;
    }

    /// Fire-and-forget: run all notifications for a send in the background.
    pub fn spawn_for_send(&self, message: Option<SentMessage>, pairs: Vec<MatchPair>) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Some(message) = message {
                notifier.notify_new_message(&message).await;
            }
            for pair in &pairs {
                notifier.notify_match(pair).await;
            }
        });
    }
}
