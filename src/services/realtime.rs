//! Real-time fan-out hub
//!
//! Tracks open WebSocket connections per user and pushes typed events to them.
//! A user may hold several connections (tabs, devices); they count as online
//! while at least one is open. Each connection owns an unbounded channel whose
//! receiver is drained by the socket's sender task.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::chat::ChatMessage;
use crate::domain::notifications::Notification;

/// Server → client events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected { user_id: Uuid, connection_id: Uuid },
    ChatMessage { chat_id: Uuid, message: ChatMessage },
    Notification { notification: Notification },
    Presence { user_id: Uuid, online: bool },
    Typing { chat_id: Uuid, user_id: Uuid },
    Error { message: String },
    Pong,
}

/// Client → server events
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Typing { chat_id: Uuid },
    Ping,
}

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Handle returned when a connection registers
pub struct Registration {
    pub connection_id: Uuid,
    pub receiver: EventReceiver,
    /// True when this is the user's first open connection
    pub came_online: bool,
}

#[derive(Clone, Default)]
pub struct RealtimeHub {
    connections: Arc<RwLock<HashMap<Uuid, HashMap<Uuid, EventSender>>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: Uuid) -> Registration {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();

        let mut conns = self.connections.write();
        let user_conns = conns.entry(user_id).or_default();
        let came_online = user_conns.is_empty();
        user_conns.insert(connection_id, tx);

        tracing::debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            connections = user_conns.len(),
            "Realtime connection registered"
        );

        Registration {
            connection_id,
            receiver: rx,
            came_online,
        }
    }

    /// Drop a connection. Returns true when the user has no connections left.
    pub fn unregister(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let mut conns = self.connections.write();
        let Some(user_conns) = conns.get_mut(&user_id) else {
            return false;
        };
        if user_conns.remove(&connection_id).is_none() {
            return false;
        }
        if user_conns.is_empty() {
            conns.remove(&user_id);
            true
        } else {
            false
        }
    }

    /// Push an event to every connection of `user_id`; returns how many
    /// connections accepted it.
    pub fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) -> usize {
        let conns = self.connections.read();
        conns
            .get(&user_id)
            .map(|user_conns| {
                user_conns
                    .values()
                    .filter(|tx| tx.send(event.clone()).is_ok())
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn send_to_users(&self, user_ids: &[Uuid], event: &ServerEvent) -> usize {
        user_ids
            .iter()
            .map(|user_id| self.send_to_user(*user_id, event))
            .sum()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.connections
            .read()
            .get(&user_id)
            .is_some_and(|c| !c.is_empty())
    }

    /// Subset of `user_ids` that currently have an open connection.
    pub fn online_among(&self, user_ids: &[Uuid]) -> HashSet<Uuid> {
        let conns = self.connections.read();
        user_ids
            .iter()
            .copied()
            .filter(|id| conns.contains_key(id))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().values().map(HashMap::len).sum()
    }

    /// Close every connection by dropping its sender; the socket tasks see the
    /// channel end and shut down.
    pub fn shutdown_all(&self) {
        let mut conns = self.connections.write();
        let count: usize = conns.values().map(HashMap::len).sum();
        conns.clear();
        tracing::info!(count, "Closed all realtime connections");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_tracks_multiple_connections() {
        let hub = RealtimeHub::new();
        let user = Uuid::new_v4();

        let first = hub.register(user);
        assert!(first.came_online);
        let second = hub.register(user);
        assert!(!second.came_online);
        assert!(hub.is_online(user));
        assert_eq!(hub.connection_count(), 2);

        assert!(!hub.unregister(user, first.connection_id));
        assert!(hub.is_online(user));
        assert!(hub.unregister(user, second.connection_id));
        assert!(!hub.is_online(user));
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn unregistering_unknown_connection_is_harmless() {
        let hub = RealtimeHub::new();
        assert!(!hub.unregister(Uuid::new_v4(), Uuid::new_v4()));
    }

    #[tokio::test]
    async fn events_reach_every_connection_of_the_user() {
        let hub = RealtimeHub::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut a = hub.register(user);
        let mut b = hub.register(user);
        let mut c = hub.register(other);

        let event = ServerEvent::Presence {
            user_id: other,
            online: true,
        };
        assert_eq!(hub.send_to_user(user, &event), 2);
        for reg in [&mut a, &mut b] {
            let received = reg.receiver.recv().await;
            assert!(matches!(
                received,
                Some(ServerEvent::Presence { user_id, online: true }) if user_id == other
            ));
        }
        assert!(c.receiver.try_recv().is_err());
    }

    #[test]
    fn closed_receivers_are_not_counted() {
        let hub = RealtimeHub::new();
        let user = Uuid::new_v4();
        let reg = hub.register(user);
        drop(reg.receiver);
        assert_eq!(hub.send_to_user(user, &ServerEvent::Pong), 0);
    }

    #[test]
    fn online_among_filters() {
        let hub = RealtimeHub::new();
        let online = Uuid::new_v4();
        let offline = Uuid::new_v4();
        let _reg = hub.register(online);
        let set = hub.online_among(&[online, offline]);
        assert!(set.contains(&online));
        assert!(!set.contains(&offline));
    }

    #[tokio::test]
    async fn shutdown_closes_channels() {
        let hub = RealtimeHub::new();
        let mut reg = hub.register(Uuid::new_v4());
        hub.shutdown_all();
        assert!(reg.receiver.recv().await.is_none());
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn event_wire_format() {
        let json = serde_json::to_value(ServerEvent::Presence {
            user_id: Uuid::nil(),
            online: false,
        })
        .unwrap();
        assert_eq!(json["type"], "presence");
        assert_eq!(json["online"], false);

        let parsed: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(parsed, ClientEvent::Ping);
    }
}
