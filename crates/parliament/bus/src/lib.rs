//! # parliament-bus
//!
//! Message substrate shared by the seven subsystems.
//!
//! - [`MessageBus`]: fire-and-forget topic fan-out. Subscribers only see
//!   envelopes published after they subscribed; there is no backlog replay.
//! - [`Requester`]: correlated request/reply on top of the bus, bounded by a
//!   timeout. An unanswered request is `Ok(None)`, not an error.
//! - [`RequestServer`]: serves a subsystem's well-known request topic
//!   through a [`RequestHandler`].

#![deny(unsafe_code)]

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use parliament_types::{Envelope, Payload, SubsystemId, Topic};
use tokio::sync::mpsc;

mod error;
mod memory_bus;
mod request;

pub use error::BusError;
pub use memory_bus::InMemoryBus;
pub use request::{RequestHandler, RequestServer, Requester};

/// Topic-based publish/subscribe.
///
/// Delivery is at-most-once per subscriber. Two publishes from the same
/// publisher on the same topic arrive in publish order; nothing is promised
/// across topics or publishers.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Stamp `payload` with the next logical timestamp and deliver it to every
    /// current subscriber of `topic`. Returns the number of subscribers reached.
    async fn publish(
        &self,
        topic: &Topic,
        sender: SubsystemId,
        payload: Payload,
    ) -> Result<usize, BusError>;

    /// Start receiving envelopes published on `topic` from now on.
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BusError>;
}

/// A live subscription to one topic.
///
/// Dropping it unsubscribes, so a cancelled caller never leaks its reply
/// topic.
pub struct Subscription {
    topic: Topic,
    receiver: mpsc::UnboundedReceiver<Envelope>,
    on_drop: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(
        topic: Topic,
        receiver: mpsc::UnboundedReceiver<Envelope>,
        on_drop: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            topic,
            receiver,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Next envelope, or `None` once the bus has shut down.
    pub async fn next(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.on_drop.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
