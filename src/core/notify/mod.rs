//! Per-production fan-out of committed state to live subscribers.
//!
//! Delivery is at-most-once. A subscriber that falls behind sees a lag
//! marker and should catch up from the message log by sequence.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use crate::core::production::{Message, Production};

/// One committed write: the production after the write and the messages the
/// write appended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionUpdate {
    pub production: Production,
    pub messages: Vec<Message>,
}

impl ProductionUpdate {
    /// Highest sequence carried by this update, if any.
    pub fn last_sequence(&self) -> Option<i64> {
        self.messages.iter().map(|m| m.sequence).max()
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone)]
pub enum Notification {
    Update(Box<ProductionUpdate>),
    /// `skipped` updates were dropped for this subscriber.
    Lagged { skipped: u64 },
}

#[derive(Clone)]
pub struct NotificationBridge {
    capacity: usize,
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<ProductionUpdate>>>>,
}

impl NotificationBridge {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribes to future updates of one production. Past updates are not
    /// replayed; read the message log for those.
    pub async fn subscribe(&self, production_id: &str) -> impl Stream<Item = Notification> + use<> {
        let receiver = {
            let mut channels = self.channels.lock().await;
            // Productions that stopped changing are never published again.
            channels.retain(|key, sender| key == production_id || sender.receiver_count() > 0);
            channels
                .entry(production_id.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        BroadcastStream::new(receiver).map(|item| match item {
            Ok(update) => Notification::Update(Box::new(update)),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => Notification::Lagged { skipped },
        })
    }

    /// Delivers to current subscribers. Never blocks on a slow subscriber and
    /// never fails the caller.
    pub async fn publish(&self, update: ProductionUpdate) {
        let mut channels = self.channels.lock().await;
        let id = update.production.id.clone();
        let Some(sender) = channels.get(&id) else {
            return;
        };
        if sender.receiver_count() == 0 {
            channels.remove(&id);
            return;
        }
        let seq = update.last_sequence();
        if sender.send(update).is_err() {
            channels.remove(&id);
        } else {
            debug!(production = %id, ?seq, "Published production update");
        }
    }

    pub async fn subscriber_count(&self, production_id: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(production_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::production::{NewMessage, Role, Stage};

    fn update(p: &Production, seq: i64) -> ProductionUpdate {
        let m = NewMessage::system(Stage::Analysis, format!("m{}", seq));
        ProductionUpdate {
            production: p.clone(),
            messages: vec![Message {
                id: format!("id-{}", seq),
                production_id: p.id.clone(),
                role: Role::System,
                stage: m.stage,
                content: m.content,
                data: m.data,
                kind: m.kind,
                timestamp: p.updated_at,
                sequence: seq,
            }],
        }
    }

    #[tokio::test]
    async fn subscribers_receive_updates_in_publish_order() {
        let bridge = NotificationBridge::new(8);
        let p = Production::new("o", "n");
        let mut a = Box::pin(bridge.subscribe(&p.id).await);
        let mut b = Box::pin(bridge.subscribe(&p.id).await);
        assert_eq!(bridge.subscriber_count(&p.id).await, 2);

        bridge.publish(update(&p, 1)).await;
        bridge.publish(update(&p, 2)).await;

        for stream in [&mut a, &mut b] {
            for expected in [1, 2] {
                match stream.next().await.unwrap() {
                    Notification::Update(u) => assert_eq!(u.last_sequence(), Some(expected)),
                    other => panic!("unexpected {:?}", other),
                }
            }
        }
    }

    #[tokio::test]
    async fn other_productions_are_not_delivered() {
        let bridge = NotificationBridge::new(8);
        let p = Production::new("o", "n");
        let q = Production::new("o", "m");
        let mut sub = Box::pin(bridge.subscribe(&p.id).await);

        bridge.publish(update(&q, 1)).await;
        bridge.publish(update(&p, 7)).await;
        match sub.next().await.unwrap() {
            Notification::Update(u) => assert_eq!(u.production.id, p.id),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn slow_subscriber_sees_lag_not_a_blocked_publisher() {
        let bridge = NotificationBridge::new(2);
        let p = Production::new("o", "n");
        let mut sub = Box::pin(bridge.subscribe(&p.id).await);

        for seq in 1..=5 {
            bridge.publish(update(&p, seq)).await;
        }
        match sub.next().await.unwrap() {
            Notification::Lagged { skipped } => assert_eq!(skipped, 3),
            other => panic!("expected lag, got {:?}", other),
        }
        match sub.next().await.unwrap() {
            Notification::Update(u) => assert_eq!(u.last_sequence(), Some(4)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let bridge = NotificationBridge::new(4);
        let p = Production::new("o", "n");
        bridge.publish(update(&p, 1)).await;

        let sub = bridge.subscribe(&p.id).await;
        drop(sub);
        bridge.publish(update(&p, 2)).await;
        assert_eq!(bridge.subscriber_count(&p.id).await, 0);
    }

    #[tokio::test]
    async fn abandoned_channels_are_pruned_by_later_subscribes() {
        let bridge = NotificationBridge::new(4);
        let done = Production::new("o", "finished");
        let live = Production::new("o", "live");

        drop(bridge.subscribe(&done.id).await);
        assert!(bridge.channels.lock().await.contains_key(&done.id));

        let _sub = bridge.subscribe(&live.id).await;
        let channels = bridge.channels.lock().await;
        assert!(!channels.contains_key(&done.id));
        assert!(channels.contains_key(&live.id));
    }
}
