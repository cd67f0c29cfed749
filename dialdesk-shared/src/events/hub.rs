/// In-process fan-out of change events
///
/// A `tokio::sync::broadcast` channel shared by every WebSocket connection of
/// the process. Receivers that fall more than [`DEFAULT_CAPACITY`] events
/// behind get `RecvError::Lagged` and continue from the oldest retained event.
///
/// Locally produced events are also forwarded to an optional outbound queue,
/// which the Redis bridge drains to publish them to other processes. Events
/// that arrived from Redis are injected with [`ChangeHub::inject`] and are
/// not forwarded again.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::{ChangeAction, ChangeEvent, EntityKind};

/// Broadcast buffer size
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ChangeHub {
    origin: String,
    sender: broadcast::Sender<ChangeEvent>,
    outbound: Option<mpsc::UnboundedSender<ChangeEvent>>,
}

impl ChangeHub {
    /// Creates a hub with the default capacity and no outbound forwarding
    pub fn new(origin: impl Into<String>) -> Self {
        Self::with_capacity(origin, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(origin: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            origin: origin.into(),
            sender,
            outbound: None,
        }
    }

    /// Forwards every locally published event to `outbound`
    pub fn with_outbound(mut self, outbound: mpsc::UnboundedSender<ChangeEvent>) -> Self {
        self.outbound = Some(outbound);
        self
    }

    /// Instance id stamped on locally produced events
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes a locally produced event
    ///
    /// Returns the number of local receivers. Having none is not an error.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        if let Some(outbound) = &self.outbound {
            if outbound.send(event.clone()).is_err() {
                tracing::warn!("Change event bridge is closed, event not forwarded");
            }
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Delivers an event received from another process to local receivers
    pub fn inject(&self, event: ChangeEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Builds and publishes an event for `data`
    ///
    /// A record that fails to serialize is published with `null` data; the
    /// entity id is still enough for clients to refetch it.
    pub fn emit<T: Serialize>(
        &self,
        tenant_id: Uuid,
        entity: EntityKind,
        action: ChangeAction,
        entity_id: Uuid,
        data: &T,
    ) -> usize {
        let data = serde_json::to_value(data).unwrap_or_else(|e| {
            tracing::warn!(error = %e, entity = entity.as_str(), "Failed to serialize change event data");
            serde_json::Value::Null
        });

        tracing::debug!(
            tenant_id = %tenant_id,
            entity = entity.as_str(),
            action = ?action,
            entity_id = %entity_id,
            "Publishing change event"
        );

        self.publish(ChangeEvent::new(
            self.origin.clone(),
            tenant_id,
            entity,
            action,
            entity_id,
            data,
        ))
    }

    /// Publishes a deletion
    pub fn emit_deleted(&self, tenant_id: Uuid, entity: EntityKind, entity_id: Uuid) -> usize {
        self.emit(
            tenant_id,
            entity,
            ChangeAction::Deleted,
            entity_id,
            &serde_json::Value::Null,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let hub = ChangeHub::new("api-test");
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let tenant = Uuid::new_v4();
        let delivered = hub.emit(
            tenant,
            EntityKind::Lead,
            ChangeAction::Created,
            Uuid::new_v4(),
            &json!({"name": "Ada"}),
        );
        assert_eq!(delivered, 2);

        let ea = a.recv().await.unwrap();
        let eb = b.recv().await.unwrap();
        assert_eq!(ea.id, eb.id);
        assert_eq!(ea.origin, "api-test");
        assert_eq!(ea.tenant_id, tenant);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = ChangeHub::new("api-test");
        assert_eq!(
            hub.emit_deleted(Uuid::new_v4(), EntityKind::Contact, Uuid::new_v4()),
            0
        );
    }

    #[tokio::test]
    async fn test_outbound_forwarding_skips_injected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hub = ChangeHub::new("api-a").with_outbound(tx);
        let _local = hub.subscribe();

        hub.emit(
            Uuid::new_v4(),
            EntityKind::Call,
            ChangeAction::Updated,
            Uuid::new_v4(),
            &json!({}),
        );
        let forwarded = rx.recv().await.unwrap();
        assert_eq!(forwarded.origin, "api-a");

        let remote = ChangeEvent::new(
            "api-b",
            Uuid::new_v4(),
            EntityKind::Call,
            ChangeAction::Updated,
            Uuid::new_v4(),
            json!({}),
        );
        assert_eq!(hub.inject(remote), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_receiver_lags() {
        let hub = ChangeHub::with_capacity("api-test", 4);
        let mut rx = hub.subscribe();
        let tenant = Uuid::new_v4();

        for _ in 0..10 {
            hub.emit(
                tenant,
                EntityKind::Call,
                ChangeAction::Updated,
                Uuid::new_v4(),
                &json!({}),
            );
        }

        match rx.recv().await {
            Err(RecvError::Lagged(skipped)) => assert_eq!(skipped, 6),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(rx.recv().await.is_ok());
    }
}
