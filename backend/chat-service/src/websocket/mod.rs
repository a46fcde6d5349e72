use crate::metrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use message_types::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

pub mod handlers;
pub mod message_types;

/// Unique identifier for one WebSocket connection
///
/// A user may hold several connections (multi-device); the id lets a closing
/// connection remove exactly itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

struct Connection {
    id: ConnectionId,
    sender: UnboundedSender<String>,
}

/// Process-wide presence: user id -> live connections.
///
/// Every operation is a single map mutation; callers never see the map.
#[derive(Default, Clone)]
pub struct PresenceRegistry {
    inner: Arc<DashMap<Uuid, Vec<Connection>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection for `user_id`.
    ///
    /// Returns the connection id (needed for [`Self::unregister`]) and the
    /// receiver of frames addressed to this connection. The first connection
    /// of a user announces `presence.online` to every other online user.
    pub fn register(&self, user_id: Uuid) -> (ConnectionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = ConnectionId::new();

        let first = {
            let mut connections = self.inner.entry(user_id).or_default();
            connections.push(Connection { id, sender: tx });
            connections.len() == 1
        };

        metrics::WS_CONNECTIONS.inc();
        tracing::debug!(user_id = %user_id, connection = ?id, first, "connection registered");

        if first {
            metrics::ONLINE_USERS.inc();
            self.broadcast_except(user_id, &ServerEvent::PresenceOnline { user_id });
        }

        (id, rx)
    }

    /// Remove a connection. When it was the user's last one, the entry is
    /// dropped and `presence.offline` is announced.
    pub fn unregister(&self, user_id: Uuid, connection_id: ConnectionId) {
        let went_offline = match self.inner.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let before = entry.get().len();
                entry.get_mut().retain(|c| c.id != connection_id);
                if entry.get().len() != before {
                    metrics::WS_CONNECTIONS.dec();
                }
                if entry.get().is_empty() {
                    entry.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        tracing::debug!(user_id = %user_id, connection = ?connection_id, went_offline, "connection unregistered");

        if went_offline {
            metrics::ONLINE_USERS.dec();
            self.broadcast_except(user_id, &ServerEvent::PresenceOffline { user_id });
        }
    }

    /// Deliver an event to every connection of `user_id`.
    ///
    /// Returns how many connections accepted it. Dead connections are pruned
    /// like an unregister; pruning the last one takes the user offline.
    pub fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) -> usize {
        let Some(frame) = Self::encode(event) else {
            return 0;
        };

        let (delivered, went_offline) = match self.inner.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let before = entry.get().len();
                entry
                    .get_mut()
                    .retain(|c| c.sender.send(frame.clone()).is_ok());
                let after = entry.get().len();
                let pruned = before - after;
                if pruned > 0 {
                    metrics::WS_CONNECTIONS.sub(pruned as i64);
                    tracing::debug!(
                        user_id = %user_id,
                        event = event.name(),
                        "{} dead connections cleaned up, {} active",
                        pruned,
                        after
                    );
                }
                if after == 0 {
                    entry.remove();
                }
                (after, after == 0)
            }
            Entry::Vacant(_) => (0, false),
        };

        if went_offline {
            metrics::ONLINE_USERS.dec();
            self.broadcast_except(user_id, &ServerEvent::PresenceOffline { user_id });
        }

        delivered
    }

    /// Deliver an event to every online user other than `except`
    pub fn broadcast_except(&self, except: Uuid, event: &ServerEvent) {
        let Some(frame) = Self::encode(event) else {
            return;
        };

        for entry in self.inner.iter() {
            if *entry.key() == except {
                continue;
            }
            for connection in entry.value() {
                let _ = connection.sender.send(frame.clone());
            }
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner
            .get(&user_id)
            .is_some_and(|connections| !connections.is_empty())
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner.get(&user_id).map(|c| c.len()).unwrap_or(0)
    }

    pub fn online_user_count(&self) -> usize {
        self.inner.len()
    }

    fn encode(event: &ServerEvent) -> Option<String> {
        match event.to_frame() {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!(event = event.name(), error = %e, "failed to encode event");
                None
            }
        }
    }
}
