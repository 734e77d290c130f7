use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zeromq::{Socket, SocketRecv, SubSocket};

use super::{Trigger, TriggerSource};

/// Delay before reading again after a failed receive.
const RECV_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A message delivered on the notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic: String,
    pub body: Vec<u8>,
}

impl Notification {
    pub fn new(topic: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
        }
    }
}

/// Push channel delivering new-block notifications.
#[async_trait]
pub trait NotificationSource: Send {
    /// Next notification, or `None` once the channel is closed.
    async fn next_notification(&mut self) -> Option<Notification>;
}

#[async_trait]
impl NotificationSource for mpsc::UnboundedReceiver<Notification> {
    async fn next_notification(&mut self) -> Option<Notification> {
        self.recv().await
    }
}

#[async_trait]
impl NotificationSource for mpsc::Receiver<Notification> {
    async fn next_notification(&mut self) -> Option<Notification> {
        self.recv().await
    }
}

/// ZeroMQ SUB socket subscribed to one topic (e.g. `hashblock`).
pub struct ZmqNotificationSource {
    socket: SubSocket,
    topic: String,
}

impl ZmqNotificationSource {
    pub async fn connect(endpoint: &str, topic: &str) -> Result<Self> {
        let mut socket = SubSocket::new();
        socket
            .connect(endpoint)
            .await
            .with_context(|| format!("failed to connect to notification endpoint {endpoint}"))?;
        socket
            .subscribe(topic)
            .await
            .with_context(|| format!("failed to subscribe to topic {topic}"))?;

        info!(endpoint, topic, "Subscribed to block notifications");

        Ok(Self {
            socket,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSource for ZmqNotificationSource {
    async fn next_notification(&mut self) -> Option<Notification> {
        loop {
            match self.socket.recv().await {
                Ok(message) => {
                    let topic = message
                        .get(0)
                        .map(|frame| String::from_utf8_lossy(frame).into_owned())
                        .unwrap_or_else(|| self.topic.clone());
                    let body = message.get(1).map(|frame| frame.to_vec()).unwrap_or_default();
                    return Some(Notification { topic, body });
                }
                Err(err) => {
                    warn!(%err, topic = %self.topic, "Failed to receive notification");
                    tokio::time::sleep(RECV_RETRY_DELAY).await;
                }
            }
        }
    }
}

/// Fires once at startup, then once per delivered notification.
///
/// Notifications are not deduplicated: a burst produces a burst of
/// triggers, each of which is a cheap no-op cycle if nothing changed.
pub struct SubscriptionTrigger<S: NotificationSource> {
    source: S,
    started: bool,
}

impl<S: NotificationSource> SubscriptionTrigger<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            started: false,
        }
    }
}

#[async_trait]
impl<S: NotificationSource> TriggerSource for SubscriptionTrigger<S> {
    async fn next_trigger(&mut self) -> Option<Trigger> {
        if !self.started {
            self.started = true;
            return Some(Trigger::Startup);
        }

        let notification = self.source.next_notification().await?;
        debug!(
            topic = %notification.topic,
            body = %hex::encode(&notification.body),
            "Received block notification"
        );
        Some(Trigger::Notification(notification))
    }
}
