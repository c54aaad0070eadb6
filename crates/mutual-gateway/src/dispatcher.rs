use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use mutual_types::events::GatewayEvent;

use crate::notifier::RealtimeRelay;

/// Tracks live WebSocket connections and routes targeted events to them.
/// A user may hold several connections (tabs, devices); each gets a copy.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> (conn_id -> sender)
    user_channels: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a per-connection channel for `user_id`. Returns (conn_id, receiver).
    pub async fn register_user_channel(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop one connection's channel; the user entry goes with its last connection.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to every live connection of `user_id`.
    /// Returns how many connections accepted it.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let channels = self.inner.user_channels.read().await;
        let Some(conns) = channels.get(&user_id) else {
            return 0;
        };
        conns.values().filter(|tx| tx.send(event.clone()).is_ok()).count()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.user_channels.read().await.values().map(HashMap::len).sum()
    }
}

#[async_trait]
impl RealtimeRelay for Dispatcher {
    async fn publish(&self, user_id: Uuid, event: GatewayEvent) {
        let delivered = self.send_to_user(user_id, event).await;
        debug!("Realtime event for {} reached {} connection(s)", user_id, delivered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(user_id: Uuid) -> GatewayEvent {
        GatewayEvent::Ready { user_id }
    }

    #[tokio::test]
    async fn events_reach_every_connection_of_the_target_only() {
        let dispatcher = Dispatcher::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (_, mut tab1) = dispatcher.register_user_channel(alice).await;
        let (_, mut tab2) = dispatcher.register_user_channel(alice).await;
        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;

        assert_eq!(dispatcher.send_to_user(alice, ready(alice)).await, 2);
        assert_eq!(tab1.recv().await, Some(ready(alice)));
        assert_eq!(tab2.recv().await, Some(ready(alice)));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregistering_last_connection_takes_user_offline() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (c1, _rx1) = dispatcher.register_user_channel(user).await;
        let (c2, _rx2) = dispatcher.register_user_channel(user).await;
        assert_eq!(dispatcher.connection_count().await, 2);

        dispatcher.unregister_user_channel(user, c1).await;
        assert!(dispatcher.is_online(user).await);

        dispatcher.unregister_user_channel(user, c2).await;
        assert!(!dispatcher.is_online(user).await);
        assert_eq!(dispatcher.send_to_user(user, ready(user)).await, 0);
    }
}
