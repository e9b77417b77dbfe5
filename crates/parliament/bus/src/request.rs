//! Correlated request/reply over the bus.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parliament_types::{CorrelationId, Payload, Reply, ReplyBody, Request, SubsystemId, Topic};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{BusError, MessageBus};

/// Issues requests on behalf of one subsystem.
///
/// Each call owns its reply topic for its lifetime only. Concurrent calls
/// from the same requester are independent and may resolve in any order.
#[derive(Clone)]
pub struct Requester {
    bus: Arc<dyn MessageBus>,
    sender: SubsystemId,
}

impl Requester {
    pub fn new(bus: Arc<dyn MessageBus>, sender: SubsystemId) -> Self {
        Self { bus, sender }
    }

    pub fn sender(&self) -> SubsystemId {
        self.sender
    }

    /// Ask `target` to perform `action` and wait up to `timeout` for its reply.
    ///
    /// Returns `Ok(None)` when nothing arrives in time or the reply is
    /// malformed. A fault reported by the callee is `BusError::Remote`.
    /// Dropping the returned future unsubscribes the reply topic.
    pub async fn request(
        &self,
        target: SubsystemId,
        action: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Option<Value>, BusError> {
        let correlation_id = CorrelationId::generate(self.sender, target);
        let reply_topic = Topic::reply(&correlation_id);

        // Subscribe before publishing so a fast reply cannot be missed.
        let mut subscription = self.bus.subscribe(&reply_topic).await?;

        let request = Request {
            correlation_id: correlation_id.clone(),
            target,
            action: action.to_string(),
            params,
            reply_topic,
        };
        self.bus
            .publish(&Topic::requests(target), self.sender, Payload::Request(request))
            .await?;

        let outcome = tokio::time::timeout(timeout, subscription.next()).await;
        drop(subscription);

        let envelope = match outcome {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                warn!(correlation_id = %correlation_id, "Reply topic closed before an answer arrived");
                return Ok(None);
            }
            Err(_) => {
                debug!(
                    correlation_id = %correlation_id,
                    target = %target,
                    action,
                    timeout_ms = timeout.as_millis() as u64,
                    "Request timed out"
                );
                return Ok(None);
            }
        };

        match envelope.payload {
            Payload::Reply(reply) if reply.correlation_id == correlation_id => match reply.body {
                ReplyBody::Ok { value } => Ok(Some(value)),
                ReplyBody::Fault { message } => Err(BusError::Remote { target, message }),
            },
            other => {
                warn!(
                    correlation_id = %correlation_id,
                    kind = other.kind(),
                    "Malformed reply, treating as no answer"
                );
                Ok(None)
            }
        }
    }
}

/// Serves requests addressed to one subsystem.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle `action`; an `Err` is sent back to the caller as a fault.
    async fn handle(&self, action: &str, params: Value) -> Result<Value, String>;
}

/// Request-serving loop for a subsystem's well-known topic.
pub struct RequestServer;

impl RequestServer {
    /// Subscribe to `request:<id>` and answer every request in its own task.
    ///
    /// The subscription is in place when this returns. The loop ends when
    /// the bus shuts down or the handle is aborted.
    pub async fn spawn(
        bus: Arc<dyn MessageBus>,
        id: SubsystemId,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<JoinHandle<()>, BusError> {
        let mut subscription = bus.subscribe(&Topic::requests(id)).await?;
        debug!(subsystem = %id, "Serving requests");

        Ok(tokio::spawn(async move {
            while let Some(envelope) = subscription.next().await {
                let request = match envelope.payload {
                    Payload::Request(request) if request.target == id => request,
                    other => {
                        warn!(subsystem = %id, kind = other.kind(), "Ignoring non-request envelope");
                        continue;
                    }
                };

                let bus = Arc::clone(&bus);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let body = match handler.handle(&request.action, request.params).await {
                        Ok(value) => ReplyBody::Ok { value },
                        Err(message) => ReplyBody::Fault { message },
                    };
                    let reply = Reply {
                        correlation_id: request.correlation_id,
                        body,
                    };
                    if let Err(err) = bus
                        .publish(&request.reply_topic, id, Payload::Reply(reply))
                        .await
                    {
                        warn!(subsystem = %id, error = %err, "Failed to publish reply");
                    }
                });
            }
            debug!(subsystem = %id, "Request loop ended");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBus;
    use serde_json::json;
    use tokio::time::Instant;

    struct EchoAfter(Duration);

    #[async_trait]
    impl RequestHandler for EchoAfter {
        async fn handle(&self, action: &str, params: Value) -> Result<Value, String> {
            tokio::time::sleep(self.0).await;
            match action {
                "echo" => Ok(params),
                "fail" => Err("refused".to_string()),
                other => Err(format!("unknown action {}", other)),
            }
        }
    }

    /// Answers with a delay taken from the request itself.
    struct Delayed;

    #[async_trait]
    impl RequestHandler for Delayed {
        async fn handle(&self, _action: &str, params: Value) -> Result<Value, String> {
            let millis = params["delay_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(params)
        }
    }

    async fn serve(bus: &InMemoryBus, id: SubsystemId, handler: impl RequestHandler) {
        let shared: Arc<dyn MessageBus> = Arc::new(bus.clone());
        RequestServer::spawn(shared, id, Arc::new(handler))
            .await
            .unwrap();
    }

    fn requester(bus: &InMemoryBus, sender: SubsystemId) -> Requester {
        Requester::new(Arc::new(bus.clone()), sender)
    }

    #[tokio::test(start_paused = true)]
    async fn reply_within_deadline_returns_payload() {
        let bus = InMemoryBus::new();
        let timeout = Duration::from_secs(4);
        serve(&bus, SubsystemId::Sentinel, EchoAfter(timeout / 2 - Duration::from_millis(1))).await;

        let reply = requester(&bus, SubsystemId::Executor)
            .request(SubsystemId::Sentinel, "echo", json!({"x": 1}), timeout)
            .await
            .unwrap();
        assert_eq!(reply, Some(json!({"x": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_callee_yields_no_answer_after_deadline() {
        let bus = InMemoryBus::new();
        let timeout = Duration::from_secs(2);
        let started = Instant::now();

        let reply = requester(&bus, SubsystemId::Executor)
            .request(SubsystemId::Sentinel, "adjudicate", json!({}), timeout)
            .await
            .unwrap();

        assert_eq!(reply, None);
        assert!(started.elapsed() >= timeout);
        assert_eq!(bus.topic_count(), 0, "reply topic must be released");
    }

    #[tokio::test(start_paused = true)]
    async fn callee_fault_is_remote_error() {
        let bus = InMemoryBus::new();
        serve(&bus, SubsystemId::Ledger, EchoAfter(Duration::ZERO)).await;

        let err = requester(&bus, SubsystemId::Strategist)
            .request(SubsystemId::Ledger, "fail", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BusError::Remote { target: SubsystemId::Ledger, ref message } if message == "refused"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_resolve_independently() {
        let bus = InMemoryBus::new();
        serve(&bus, SubsystemId::Ledger, Delayed).await;
        let client = requester(&bus, SubsystemId::Strategist);
        let timeout = Duration::from_secs(5);

        let slow = client.request(SubsystemId::Ledger, "score", json!({"delay_ms": 300, "id": "slow"}), timeout);
        let fast = client.request(SubsystemId::Ledger, "score", json!({"delay_ms": 10, "id": "fast"}), timeout);
        let (slow, fast) = tokio::join!(slow, fast);

        assert_eq!(slow.unwrap().unwrap()["id"], "slow");
        assert_eq!(fast.unwrap().unwrap()["id"], "fast");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_request_releases_reply_topic() {
        let bus = InMemoryBus::new();
        let client = requester(&bus, SubsystemId::Executor);

        let pending = client.request(
            SubsystemId::Sentinel,
            "adjudicate",
            json!({}),
            Duration::from_secs(60),
        );
        let cancelled = tokio::time::timeout(Duration::from_millis(50), pending).await;
        assert!(cancelled.is_err());
        assert_eq!(bus.topic_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_reply_is_treated_as_no_answer() {
        let bus = InMemoryBus::new();
        let shared: Arc<dyn MessageBus> = Arc::new(bus.clone());
        let mut incoming = bus.subscribe(&Topic::requests(SubsystemId::Mirror)).await.unwrap();

        let impostor = Arc::clone(&shared);
        tokio::spawn(async move {
            if let Some(envelope) = incoming.next().await {
                if let Payload::Request(request) = envelope.payload {
                    let reply = Reply {
                        correlation_id: CorrelationId("someone-else".into()),
                        body: ReplyBody::Ok { value: json!(1) },
                    };
                    let _ = impostor
                        .publish(&request.reply_topic, SubsystemId::Mirror, Payload::Reply(reply))
                        .await;
                }
            }
        });

        let reply = Requester::new(shared, SubsystemId::Interpreter)
            .request(SubsystemId::Mirror, "reflect", json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, None);
    }
}
