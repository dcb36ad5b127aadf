//! Realtime feed subscription
//!
//! Opens `/ws` with the session token, subscribes one channel to the
//! signed-in user's bookmark changes and forwards every change payload to
//! an mpsc sink (usually a `Reconciler`). The status moves through
//! `Subscribing -> Subscribed` and ends at `Unsubscribed` when the socket
//! closes, the server refuses the subscription, or `unsubscribe` is called.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use super::api::ApiClient;
use super::error::ClientError;
use crate::realtime::{ChangeEvent, ClientMessage, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Unsubscribed,
    Subscribing,
    Subscribed,
}

/// Connection settings for the realtime endpoint
#[derive(Debug, Clone)]
pub struct RealtimeFeed {
    url: String,
    session_token: String,
}

impl RealtimeFeed {
    pub fn new(url: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session_token: session_token.into(),
        }
    }

    /// Same server and session as an existing API client
    pub fn for_client(client: &ApiClient) -> Result<Self, ClientError> {
        Ok(Self::new(
            client.websocket_url()?,
            client.config().session_token.clone(),
        ))
    }

    /// Connect and subscribe `channel` to `user_id`'s changes.
    ///
    /// Returns once the subscribe request is on the wire; use
    /// `FeedSubscription::subscribed` to wait for the server's ack.
    pub async fn subscribe(
        &self,
        channel: &str,
        user_id: Uuid,
        sink: mpsc::Sender<ChangeEvent>,
    ) -> Result<FeedSubscription, ClientError> {
        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.session_token))
            .map_err(|e| ClientError::Protocol(format!("invalid session token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws, _response) = connect_async(request).await?;
        tracing::debug!(url = %self.url, channel, "Realtime connection opened");

        let (mut write, mut read) = ws.split();

        let subscribe = serde_json::to_string(&ClientMessage::subscribe_owner(channel, user_id))?;
        write.send(Message::Text(subscribe)).await?;

        let (status_tx, status_rx) = watch::channel(SubscriptionStatus::Subscribing);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let channel = channel.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        let unsubscribe = ClientMessage::Unsubscribe { channel: channel.clone() };
                        if let Ok(text) = serde_json::to_string(&unsubscribe) {
                            let _ = write.send(Message::Text(text)).await;
                        }
                        let _ = write.close().await;
                        break;
                    }
                    frame = read.next() => {
                        let text = match frame {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::debug!(channel = %channel, "Realtime connection closed");
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                tracing::warn!(channel = %channel, error = %e, "Realtime connection error");
                                break;
                            }
                        };

                        let message = match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                tracing::warn!(error = %e, "Ignoring unreadable realtime frame");
                                continue;
                            }
                        };

                        match message {
                            ServerMessage::Subscribed { channel: c, topic } if c == channel => {
                                tracing::info!(channel = %c, topic = %topic, "Subscribed to bookmark changes");
                                status_tx.send_replace(SubscriptionStatus::Subscribed);
                            }
                            ServerMessage::Change { channel: c, payload } if c == channel => {
                                tracing::debug!(
                                    channel = %c,
                                    committed_at = %payload.commit_timestamp(),
                                    "Change received"
                                );
                                if sink.send(payload).await.is_err() {
                                    tracing::debug!("Change sink dropped, leaving feed");
                                    break;
                                }
                            }
                            ServerMessage::Unsubscribed { channel: c } if c == channel => break,
                            ServerMessage::Error { message } => {
                                tracing::warn!(channel = %channel, error = %message, "Realtime server error");
                                if *status_tx.borrow() == SubscriptionStatus::Subscribing {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }

            status_tx.send_replace(SubscriptionStatus::Unsubscribed);
        });

        Ok(FeedSubscription {
            status: status_rx,
            stop: Some(stop_tx),
            task,
        })
    }
}

/// A live channel subscription
pub struct FeedSubscription {
    status: watch::Receiver<SubscriptionStatus>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl FeedSubscription {
    pub fn status(&self) -> SubscriptionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.clone()
    }

    /// Wait for the server to acknowledge the subscription
    pub async fn subscribed(&mut self) -> Result<(), ClientError> {
        loop {
            match *self.status.borrow_and_update() {
                SubscriptionStatus::Subscribed => return Ok(()),
                SubscriptionStatus::Unsubscribed => {
                    return Err(ClientError::Protocol("subscription refused".to_string()))
                }
                SubscriptionStatus::Subscribing => {}
            }
            if self.status.changed().await.is_err() {
                return match *self.status.borrow() {
                    SubscriptionStatus::Subscribed => Ok(()),
                    _ => Err(ClientError::Protocol("subscription closed".to_string())),
                };
            }
        }
    }

    /// Tear the channel down and wait for the connection to close
    pub async fn unsubscribe(mut self) -> SubscriptionStatus {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!(error = %e, "Realtime feed task failed");
        }
        *self.status.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::api::testing::{signed_in, test_state};
    use crate::client::{BookmarkList, Reconciler};
    use crate::storage::NewBookmark;
    use std::net::SocketAddr;
    use std::time::Duration;

    async fn spawn_server(state: crate::api::AppState) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<BookmarkList>, pred: F)
    where
        F: Fn(&BookmarkList) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if pred(&rx.borrow_and_update()) {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_feed_drives_reconciler() {
        let state = test_state().await;
        let (ada, token) = signed_in(&state, "ada").await;
        let addr = spawn_server(state.clone()).await;

        let reconciler = Reconciler::spawn(Vec::new());
        let mut snapshots = reconciler.subscribe();

        let feed = RealtimeFeed::new(format!("ws://{}/ws", addr), token);
        let mut subscription = feed
            .subscribe("bookmarks-channel", ada.id, reconciler.sender())
            .await
            .unwrap();
        subscription.subscribed().await.unwrap();
        assert_eq!(subscription.status(), SubscriptionStatus::Subscribed);

        let created = state
            .create_bookmark(&ada, NewBookmark::new("https://rust-lang.org", "Rust"))
            .await
            .unwrap();
        wait_for(&mut snapshots, |l| l.contains(created.id)).await;
        assert_eq!(reconciler.snapshot().items()[0], created);

        state.delete_bookmark(&ada, created.id).await.unwrap();
        wait_for(&mut snapshots, |l| l.is_empty()).await;

        assert_eq!(subscription.unsubscribe().await, SubscriptionStatus::Unsubscribed);

        // The server drops the channel once the socket goes away
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.hub.channel_count().await > 0 || state.hub.connection_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn test_other_users_changes_not_delivered() {
        let state = test_state().await;
        let (ada, token) = signed_in(&state, "ada").await;
        let (bob, _) = signed_in(&state, "bob").await;
        let addr = spawn_server(state.clone()).await;

        let (sink, mut events) = mpsc::channel(16);
        let feed = RealtimeFeed::new(format!("ws://{}/ws", addr), token);
        let mut subscription = feed
            .subscribe("bookmarks-channel", ada.id, sink)
            .await
            .unwrap();
        subscription.subscribed().await.unwrap();

        state
            .create_bookmark(&bob, NewBookmark::new("https://bob.example.com", "Bob's"))
            .await
            .unwrap();
        let mine = state
            .create_bookmark(&ada, NewBookmark::new("https://ada.example.com", "Ada's"))
            .await
            .unwrap();

        // Bob's insert was published first, so the first event seen must be Ada's
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            ChangeEvent::Insert { new, .. } => assert_eq!(new.id, mine.id),
            other => panic!("unexpected event {:?}", other),
        }

        subscription.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_sign_out_closes_open_feed() {
        let state = test_state().await;
        let (ada, token) = signed_in(&state, "ada").await;
        let addr = spawn_server(state.clone()).await;

        let (sink, _events) = mpsc::channel(16);
        let feed = RealtimeFeed::new(format!("ws://{}/ws", addr), token.clone());
        let mut subscription = feed
            .subscribe("bookmarks-channel", ada.id, sink)
            .await
            .unwrap();
        subscription.subscribed().await.unwrap();
        let mut status = subscription.watch_status();

        let response = reqwest::Client::new()
            .post(format!("http://{}/auth/sign-out", addr))
            .header("cookie", format!("smartmark_session={}", token))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        tokio::time::timeout(Duration::from_secs(5), async {
            while *status.borrow_and_update() != SubscriptionStatus::Unsubscribed {
                if status.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(subscription.status(), SubscriptionStatus::Unsubscribed);
        assert_eq!(state.hub.connection_count().await, 0);
        assert_eq!(state.hub.channel_count().await, 0);

        // Later changes have nowhere to go
        let event = ChangeEvent::deleted(uuid::Uuid::new_v4());
        assert_eq!(state.hub.publish(ada.id, &event).await, 0);
    }

    #[tokio::test]
    async fn test_foreign_subscription_refused() {
        let state = test_state().await;
        let (_ada, token) = signed_in(&state, "ada").await;
        let (bob, _) = signed_in(&state, "bob").await;
        let addr = spawn_server(state.clone()).await;

        let (sink, _events) = mpsc::channel(16);
        let feed = RealtimeFeed::new(format!("ws://{}/ws", addr), token);
        let mut subscription = feed
            .subscribe("bookmarks-channel", bob.id, sink)
            .await
            .unwrap();

        assert!(subscription.subscribed().await.is_err());
        assert_eq!(subscription.status(), SubscriptionStatus::Unsubscribed);
    }

    #[tokio::test]
    async fn test_missing_session_rejected() {
        let state = test_state().await;
        let (ada, _) = signed_in(&state, "ada").await;
        let addr = spawn_server(state).await;

        let (sink, _events) = mpsc::channel(16);
        let feed = RealtimeFeed::new(format!("ws://{}/ws", addr), "not-a-session");
        let result = feed.subscribe("bookmarks-channel", ada.id, sink).await;

        assert!(matches!(result, Err(ClientError::WebSocket(_))));
    }
}
