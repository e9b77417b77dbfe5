//! In-process bus backed by unbounded channels, one per subscriber.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use parliament_types::{Envelope, LogicalTimestamp, Payload, SubsystemId, Topic};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{BusError, MessageBus, Subscription};

struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<Envelope>,
}

#[derive(Default)]
struct Registry {
    topics: DashMap<Topic, Vec<Subscriber>>,
    next_subscriber: AtomicU64,
}

impl Registry {
    fn unsubscribe(&self, topic: &Topic, id: u64) {
        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            subscribers.retain(|s| s.id != id);
        }
        self.topics.remove_if(topic, |_, subscribers| subscribers.is_empty());
    }
}

/// In-memory [`MessageBus`].
///
/// Cloning shares the same topics and logical clock.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    registry: Arc<Registry>,
    clock: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.registry
            .topics
            .get(topic)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.registry.topics.len()
    }

    /// Current value of the logical clock.
    pub fn now(&self) -> LogicalTimestamp {
        LogicalTimestamp(self.clock.load(Ordering::SeqCst))
    }

    /// Refuse further traffic and end every open subscription.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.registry.topics.clear();
            info!("Message bus closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Unavailable("bus is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(
        &self,
        topic: &Topic,
        sender: SubsystemId,
        payload: Payload,
    ) -> Result<usize, BusError> {
        self.ensure_open()?;

        let timestamp = LogicalTimestamp(self.clock.fetch_add(1, Ordering::SeqCst) + 1);
        let kind = payload.kind();
        let envelope = Envelope::new(sender, timestamp, payload);

        let delivered = match self.registry.topics.get_mut(topic) {
            Some(mut subscribers) => {
                // Receivers that went away without unsubscribing are pruned here.
                subscribers.retain(|s| s.sender.send(envelope.clone()).is_ok());
                subscribers.len()
            }
            None => 0,
        };
        if delivered == 0 {
            self.registry
                .topics
                .remove_if(topic, |_, subscribers| subscribers.is_empty());
        }

        debug!(
            topic = %topic,
            sender = %sender,
            kind,
            timestamp = timestamp.0,
            delivered,
            "Published envelope"
        );
        Ok(delivered)
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BusError> {
        self.ensure_open()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.registry.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.registry
            .topics
            .entry(topic.clone())
            .or_default()
            .push(Subscriber { id, sender });

        let registry: Weak<Registry> = Arc::downgrade(&self.registry);
        let owned_topic = topic.clone();
        Ok(Subscription::new(topic.clone(), receiver, move || {
            if let Some(registry) = registry.upgrade() {
                registry.unsubscribe(&owned_topic, id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(n: u64) -> Payload {
        Payload::Event {
            body: json!({ "n": n }),
        }
    }

    #[tokio::test]
    async fn fans_out_to_every_subscriber() {
        let bus = InMemoryBus::new();
        let topic = Topic::new("system:test");
        let mut first = bus.subscribe(&topic).await.unwrap();
        let mut second = bus.subscribe(&topic).await.unwrap();

        let delivered = bus
            .publish(&topic, SubsystemId::Mirror, event(1))
            .await
            .unwrap();
        assert_eq!(delivered, 2);

        let a = first.next().await.unwrap();
        let b = second.next().await.unwrap();
        assert_eq!(a.sender, SubsystemId::Mirror);
        assert_eq!(a.timestamp, b.timestamp);
    }

    #[tokio::test]
    async fn late_subscribers_get_no_backlog() {
        let bus = InMemoryBus::new();
        let topic = Topic::new("system:test");
        bus.publish(&topic, SubsystemId::Ledger, event(1))
            .await
            .unwrap();

        let mut late = bus.subscribe(&topic).await.unwrap();
        bus.publish(&topic, SubsystemId::Ledger, event(2))
            .await
            .unwrap();

        let envelope = late.next().await.unwrap();
        match envelope.payload {
            Payload::Event { body } => assert_eq!(body["n"], 2),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn per_publisher_order_and_monotonic_clock() {
        let bus = InMemoryBus::new();
        let topic = Topic::new("system:test");
        let mut sub = bus.subscribe(&topic).await.unwrap();

        for n in 0..5 {
            bus.publish(&topic, SubsystemId::Strategist, event(n))
                .await
                .unwrap();
        }

        let mut last = LogicalTimestamp::default();
        for n in 0..5 {
            let envelope = sub.next().await.unwrap();
            assert!(envelope.timestamp > last);
            last = envelope.timestamp;
            match envelope.payload {
                Payload::Event { body } => assert_eq!(body["n"], n),
                other => panic!("unexpected payload {:?}", other),
            }
        }
        assert_eq!(bus.now(), last);
    }

    #[tokio::test]
    async fn dropping_a_subscription_unsubscribes() {
        let bus = InMemoryBus::new();
        let topic = Topic::new("response:abc");
        let sub = bus.subscribe(&topic).await.unwrap();
        assert_eq!(bus.subscriber_count(&topic), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(&topic), 0);
        assert_eq!(bus.topic_count(), 0);
    }

    #[tokio::test]
    async fn closed_bus_is_unavailable() {
        let bus = InMemoryBus::new();
        let topic = Topic::new("system:test");
        let mut sub = bus.subscribe(&topic).await.unwrap();

        bus.close();
        assert!(sub.next().await.is_none());
        assert!(matches!(
            bus.publish(&topic, SubsystemId::Mirror, event(1)).await,
            Err(BusError::Unavailable(_))
        ));
        assert!(matches!(
            bus.subscribe(&topic).await,
            Err(BusError::Unavailable(_))
        ));
    }
}
