/// Change-event bridge over Redis pub/sub
///
/// Every API instance and the dialer publish their change events as JSON on
/// [`CHANGES_CHANNEL`]. Each API instance also subscribes and injects events
/// from other origins into its local [`ChangeHub`]; its own events come back
/// through Redis too and are dropped by origin.
///
/// ```text
/// ┌──────────┐  PUBLISH   ┌──────────────────┐  SUBSCRIBE  ┌──────────┐
/// │  dialer  │ ─────────> │ dialdesk:changes │ ──────────> │  api #1  │ ──> WebSocket
/// └──────────┘            └──────────────────┘             └──────────┘
///                                  ▲                            │
///                                  └────────── PUBLISH ─────────┘
/// ```

use futures::StreamExt;
use redis::AsyncCommands;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::client::{RedisClient, RedisClientError};
use crate::events::{ChangeEvent, ChangeHub};

/// Pub/sub channel carrying change events
pub const CHANGES_CHANNEL: &str = "dialdesk:changes";

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisClientError),

    #[error("Failed to encode change event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<redis::RedisError> for BridgeError {
    fn from(err: redis::RedisError) -> Self {
        BridgeError::Redis(err.into())
    }
}

/// Publishes change events on [`CHANGES_CHANNEL`]
#[derive(Clone)]
pub struct ChangePublisher {
    client: RedisClient,
}

impl ChangePublisher {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    /// Returns the number of subscribers that received the event
    pub async fn publish(&self, event: &ChangeEvent) -> Result<usize, BridgeError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.client.get_connection();
        let receivers: usize = conn.publish(CHANGES_CHANNEL, payload).await?;
        Ok(receivers)
    }

    /// Drains `outbound` and publishes each event until the sender is dropped
    ///
    /// Publish failures are logged and the event is dropped; local clients
    /// already received it through the hub.
    pub fn spawn(self, mut outbound: mpsc::UnboundedReceiver<ChangeEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = outbound.recv().await {
                if let Err(e) = self.publish(&event).await {
                    tracing::warn!(
                        error = %e,
                        event_id = %event.id,
                        entity = event.entity.as_str(),
                        "Failed to publish change event to Redis"
                    );
                }
            }
            tracing::debug!("Change event publisher stopped");
        })
    }
}

/// Decodes a pub/sub payload, returning `None` for the hub's own events
pub fn decode_remote(payload: &str, own_origin: &str) -> Result<Option<ChangeEvent>, BridgeError> {
    let event: ChangeEvent = serde_json::from_str(payload)?;
    if event.origin == own_origin {
        Ok(None)
    } else {
        Ok(Some(event))
    }
}

/// Subscribes to [`CHANGES_CHANNEL`] and injects remote events into `hub`
///
/// Reconnects after [`RESUBSCRIBE_DELAY`] whenever the subscription ends.
/// Runs until the returned handle is aborted.
pub fn spawn_subscriber(client: RedisClient, hub: ChangeHub) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match subscribe_once(&client, &hub).await {
                Ok(()) => tracing::warn!("Redis change subscription ended, resubscribing"),
                Err(e) => tracing::error!(error = %e, "Redis change subscription failed"),
            }
            tokio::time::sleep(RESUBSCRIBE_DELAY).await;
        }
    })
}

async fn subscribe_once(client: &RedisClient, hub: &ChangeHub) -> Result<(), BridgeError> {
    let mut pubsub = client.pubsub().await?;
    pubsub.subscribe(CHANGES_CHANNEL).await?;

    tracing::info!(channel = CHANGES_CHANNEL, origin = hub.origin(), "Subscribed to change events");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Non-text payload on change channel");
                continue;
            }
        };

        match decode_remote(&payload, hub.origin()) {
            Ok(Some(event)) => {
                hub.inject(event);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Malformed change event on Redis channel"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChangeAction, EntityKind};
    use serde_json::json;
    use uuid::Uuid;

    fn event(origin: &str) -> ChangeEvent {
        ChangeEvent::new(
            origin,
            Uuid::new_v4(),
            EntityKind::Call,
            ChangeAction::Updated,
            Uuid::new_v4(),
            json!({"status": "ringing"}),
        )
    }

    #[test]
    fn test_decode_remote_skips_own_origin() {
        let own = serde_json::to_string(&event("api-a")).unwrap();
        assert!(decode_remote(&own, "api-a").unwrap().is_none());

        let remote = event("dialer-1");
        let payload = serde_json::to_string(&remote).unwrap();
        assert_eq!(decode_remote(&payload, "api-a").unwrap(), Some(remote));
    }

    #[test]
    fn test_decode_remote_rejects_garbage() {
        assert!(matches!(
            decode_remote("{not json", "api-a"),
            Err(BridgeError::Encode(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_publish_and_subscribe() {
        use crate::redis::client::RedisConfig;

        let client = RedisClient::new(RedisConfig::new("redis://localhost:6379"))
            .await
            .unwrap();
        let hub = ChangeHub::new("api-test");
        let mut rx = hub.subscribe();

        let handle = spawn_subscriber(client.clone(), hub.clone());
        tokio::time::sleep(Duration::from_millis(200)).await;

        let remote = event("dialer-test");
        ChangePublisher::new(client).publish(&remote).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, remote.id);
        handle.abort();
    }
}
