use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use travelsbud_types::events::GatewayEvent;

/// Routes targeted events to connected users.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// Per-user targeted send channels: user_id -> (conn_id, sender).
    /// A newer connection of the same user replaces the older one.
    user_channels: RwLock<HashMap<String, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: &str,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id.to_string(), (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    pub async fn unregister_user_channel(&self, user_id: &str, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if channels
            .get(user_id)
            .is_some_and(|(stored_conn_id, _)| *stored_conn_id == conn_id)
        {
            channels.remove(user_id);
        }
    }

    /// Send a targeted event to a specific user. Users without a live
    /// connection simply miss it.
    pub async fn send_to_user(&self, user_id: &str, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        match channels.get(user_id) {
            Some((_, tx)) => {
                let _ = tx.send(event);
            }
            None => debug!("{} not connected, dropping targeted event", user_id),
        }
    }

    #[cfg(test)]
    async fn is_connected(&self, user_id: &str) -> bool {
        self.inner.user_channels.read().await.contains_key(user_id)
    }
}
