//! Realtime Connection Hub
//!
//! Tracks open websocket connections, the channels each one listens on, and
//! routes bookmark change events to the owner's subscribers only.
//!
//! Lock order: `connections` before `subscriptions`, everywhere.

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::{
    owner_topic, parse_owner_filter, ChangeEvent, EventFilter, ServerMessage, BOOKMARKS_TABLE,
};

/// Unique identifier for a websocket connection
pub type ConnectionId = String;

/// Manages all websocket connections and subscriptions
pub struct ConnectionHub {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    /// Topic → connections with at least one channel on it
    subscriptions: RwLock<HashMap<String, HashSet<ConnectionId>>>,
    config: HubConfig,
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

/// One channel opened by a connection
#[derive(Debug, Clone)]
struct ChannelSubscription {
    topic: String,
    event: EventFilter,
}

/// Handle for sending messages to a specific connection
pub struct ConnectionHandle {
    /// Signed-in user that opened the socket
    pub user_id: Uuid,
    /// Session token the socket was opened with
    session: Option<String>,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    /// Channel name → subscription
    channels: HashMap<String, ChannelSubscription>,
}

impl ConnectionHandle {
    fn uses_topic(&self, topic: &str) -> bool {
        self.channels.values().any(|c| c.topic == topic)
    }
}

impl ConnectionHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a connection opened by `user_id`
    pub async fn register(
        &self,
        user_id: Uuid,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        self.register_with_session(user_id, None, sender).await
    }

    /// Register a connection and remember the session it was opened with,
    /// so `disconnect_session` can close it on sign-out
    pub async fn register_with_session(
        &self,
        user_id: Uuid,
        session: Option<String>,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        connections.insert(
            id.clone(),
            ConnectionHandle {
                user_id,
                session,
                sender,
                channels: HashMap::new(),
            },
        );

        tracing::info!(connection_id = %id, user_id = %user_id, "Realtime client connected");
        Ok(id)
    }

    /// Unregister a connection and drop all its channels
    pub async fn unregister(&self, id: &str) {
        let mut connections = self.connections.write().await;
        let Some(handle) = connections.remove(id) else {
            return;
        };

        let mut subs = self.subscriptions.write().await;
        for channel in handle.channels.values() {
            remove_subscriber(&mut subs, &channel.topic, id);
        }

        tracing::info!(connection_id = %id, "Realtime client disconnected");
    }

    /// Drop every connection opened with `token`.
    ///
    /// Dropping a handle drops its sender, which ends the socket's send loop
    /// and closes the socket. Returns the number of connections removed.
    pub async fn disconnect_session(&self, token: &str) -> usize {
        let mut connections = self.connections.write().await;
        let ids: Vec<ConnectionId> = connections
            .iter()
            .filter(|(_, h)| h.session.as_deref() == Some(token))
            .map(|(id, _)| id.clone())
            .collect();
        if ids.is_empty() {
            return 0;
        }

        let mut subs = self.subscriptions.write().await;
        for id in &ids {
            if let Some(handle) = connections.remove(id) {
                for channel in handle.channels.values() {
                    remove_subscriber(&mut subs, &channel.topic, id);
                }
            }
        }

        tracing::info!(closed = ids.len(), "Closed realtime connections for ended session");
        ids.len()
    }

    /// Open (or replace) a channel on a connection.
    ///
    /// Only the bookmarks table is published, and the filter must name the
    /// connection's own user. Returns the topic the channel is bound to.
    pub async fn subscribe(
        &self,
        id: &str,
        channel: &str,
        table: &str,
        event: EventFilter,
        filter: Option<&str>,
    ) -> Result<String, HubError> {
        if table != BOOKMARKS_TABLE {
            return Err(HubError::UnknownTable(table.to_string()));
        }

        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let owner = match filter {
            None => handle.user_id,
            Some(f) => parse_owner_filter(f).ok_or_else(|| HubError::InvalidFilter(f.to_string()))?,
        };
        if owner != handle.user_id {
            tracing::warn!(
                connection_id = %id,
                requested = %owner,
                "Refused subscription to another user's rows"
            );
            return Err(HubError::Forbidden);
        }

        let topic = owner_topic(owner);
        let previous = handle.channels.insert(
            channel.to_string(),
            ChannelSubscription {
                topic: topic.clone(),
                event,
            },
        );

        let mut subs = self.subscriptions.write().await;
        if let Some(previous) = previous {
            if !handle.uses_topic(&previous.topic) {
                remove_subscriber(&mut subs, &previous.topic, id);
            }
        }
        subs.entry(topic.clone()).or_default().insert(id.to_string());

        tracing::debug!(connection_id = %id, channel = %channel, topic = %topic, "Subscribed");
        Ok(topic)
    }

    /// Close a channel. Returns whether the channel existed.
    pub async fn unsubscribe(&self, id: &str, channel: &str) -> Result<bool, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let Some(removed) = handle.channels.remove(channel) else {
            return Ok(false);
        };

        if !handle.uses_topic(&removed.topic) {
            let mut subs = self.subscriptions.write().await;
            remove_subscriber(&mut subs, &removed.topic, id);
        }

        tracing::debug!(connection_id = %id, channel = %channel, "Unsubscribed");
        Ok(true)
    }

    /// Deliver a change to every channel listening on `owner`'s rows.
    ///
    /// Sends happen before this returns, so events published in sequence
    /// reach each subscriber in that sequence. Returns the number of
    /// channels the event was delivered to.
    pub async fn publish(&self, owner: Uuid, event: &ChangeEvent) -> usize {
        let topic = owner_topic(owner);
        let connections = self.connections.read().await;
        let subs = self.subscriptions.read().await;

        let Some(subscriber_ids) = subs.get(&topic) else {
            return 0;
        };

        let mut delivered = 0;
        for id in subscriber_ids {
            let Some(handle) = connections.get(id) else {
                continue;
            };
            for (channel, sub) in &handle.channels {
                if sub.topic != topic || !sub.event.matches(event) {
                    continue;
                }
                let message = ServerMessage::Change {
                    channel: channel.clone(),
                    payload: event.clone(),
                };
                if handle.sender.send(message).is_ok() {
                    delivered += 1;
                }
            }
        }

        tracing::trace!(topic = %topic, delivered, "Published change");
        delivered
    }

    /// Send a message directly to a specific connection
    pub async fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), HubError> {
        let connections = self.connections.read().await;
        let handle = connections.get(id).ok_or(HubError::ConnectionNotFound)?;

        handle
            .sender
            .send(message)
            .map_err(|_| HubError::SendFailed)
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of connections listening on a topic
    pub async fn subscription_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Open channels across all connections
    pub async fn channel_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .map(|h| h.channels.len())
            .sum()
    }
}

fn remove_subscriber(subs: &mut HashMap<String, HashSet<ConnectionId>>, topic: &str, id: &str) {
    if let Some(subscribers) = subs.get_mut(topic) {
        subscribers.remove(id);
        if subscribers.is_empty() {
            subs.remove(topic);
        }
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Failed to send message")]
    SendFailed,

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Invalid filter '{0}', expected user_id=eq.<uuid>")]
    InvalidFilter(String),

    #[error("Subscriptions are limited to your own bookmarks")]
    Forbidden,
}
