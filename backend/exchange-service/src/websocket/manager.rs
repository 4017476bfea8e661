/// Live connection registry
///
/// Maps each online user to exactly one outbound channel. Registering a
/// second connection for the same user replaces the first (last writer
/// wins); the replaced session sees its channel close. Nothing here is
/// persisted, the map is rebuilt from whoever is connected.
use super::WsOutboundEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Type alias for the per-connection outbound channel
pub type EventSender = mpsc::UnboundedSender<WsOutboundEvent>;

/// Identifies one registration, so a stale session cannot evict its replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct Connection {
    id: ConnectionId,
    sender: EventSender,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid, sender: EventSender) -> ConnectionId {
        let id = ConnectionId::new();
        let replaced = self
            .connections
            .write()
            .await
            .insert(user_id, Connection { id, sender });

        if replaced.is_some() {
            tracing::info!(%user_id, "replaced existing live connection");
        }
        id
    }

    /// Removes the entry only if it still belongs to `connection_id`
    pub async fn unregister(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&user_id) {
            Some(conn) if conn.id == connection_id => {
                connections.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Best-effort push. Returns false when the user is offline or the
    /// channel has already closed (the dead entry is dropped).
    pub async fn send(&self, user_id: Uuid, event: WsOutboundEvent) -> bool {
        let dead = {
            let connections = self.connections.read().await;
            match connections.get(&user_id) {
                Some(conn) => match conn.sender.send(event) {
                    Ok(()) => return true,
                    Err(_) => conn.id,
                },
                None => return false,
            }
        };

        tracing::debug!(%user_id, "dropping closed connection");
        self.unregister(user_id, dead).await;
        false
    }

    pub async fn connected_users_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
