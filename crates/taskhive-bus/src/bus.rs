use crate::message::BusMessage;
use crate::pattern::{validate_topic, TopicPattern};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskhive_core::{topics, BusConfig, HiveError, HiveResult};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

/// Bounded drop-oldest mailbox for one subscription.
struct SubQueue {
    depth: usize,
    inner: Mutex<VecDeque<BusMessage>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl SubQueue {
    fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, message: BusMessage) {
        {
            let mut queue = self.inner.lock().expect("subscription queue poisoned");
            if queue.len() >= self.depth {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(message);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

struct SubEntry {
    pattern: TopicPattern,
    queue: Arc<SubQueue>,
}

#[derive(Default)]
struct BusState {
    next_sub_id: u64,
    subs: HashMap<u64, SubEntry>,
    history: VecDeque<BusMessage>,
    published: HashMap<String, u64>,
}

struct BusShared {
    config: BusConfig,
    state: Mutex<BusState>,
}

/// Topic-based pub/sub with at-most-once in-memory delivery.
///
/// Every subscription owns a bounded queue; a slow subscriber never blocks
/// a publisher, overflow drops the subscriber's oldest pending message.
/// Messages from one sender to one topic are observed in publish order.
#[derive(Clone)]
pub struct Bus {
    shared: Arc<BusShared>,
}

impl Bus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            shared: Arc::new(BusShared {
                config,
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    /// Subscribe to a dotted-glob topic pattern. Dropping the returned
    /// handle unsubscribes.
    pub fn subscribe(&self, pattern: &str) -> HiveResult<Subscription> {
        let pattern = TopicPattern::parse(pattern)?;
        let queue = Arc::new(SubQueue::new(self.shared.config.queue_depth));

        let id = {
            let mut state = self.shared.state.lock().expect("bus state poisoned");
            let id = state.next_sub_id;
            state.next_sub_id += 1;
            state.subs.insert(
                id,
                SubEntry {
                    pattern: pattern.clone(),
                    queue: Arc::clone(&queue),
                },
            );
            id
        };

        debug!(pattern = %pattern.as_str(), sub_id = id, "Subscribed");
        Ok(Subscription {
            id,
            queue,
            bus: self.clone(),
        })
    }

    /// Publish a message; fan-out to every matching subscription happens
    /// without holding the subscriber-table lock.
    pub fn publish(
        &self,
        sender: &str,
        topic: &str,
        payload: serde_json::Value,
    ) -> HiveResult<Uuid> {
        self.publish_message(BusMessage::new(sender, topic, payload))
    }

    /// Publish with an explicit correlation id (request/reply plumbing).
    pub fn publish_correlated(
        &self,
        sender: &str,
        topic: &str,
        payload: serde_json::Value,
        correlation_id: Uuid,
    ) -> HiveResult<Uuid> {
        self.publish_message(BusMessage::new(sender, topic, payload).with_correlation(correlation_id))
    }

    fn publish_message(&self, message: BusMessage) -> HiveResult<Uuid> {
        validate_topic(&message.topic)?;
        let id = message.id;

        let targets: Vec<Arc<SubQueue>> = {
            let mut state = self.shared.state.lock().expect("bus state poisoned");
            *state.published.entry(message.topic.clone()).or_insert(0) += 1;
            state.history.push_back(message.clone());
            let limit = self.shared.config.history_limit;
            while state.history.len() > limit {
                state.history.pop_front();
            }
            state
                .subs
                .values()
                .filter(|entry| entry.pattern.matches(&message.topic))
                .map(|entry| Arc::clone(&entry.queue))
                .collect()
        };

        for queue in targets {
            queue.push(message.clone());
        }
        Ok(id)
    }

    /// Publish a reply to `request` on its reply topic, echoing the
    /// correlation id.
    pub fn respond(
        &self,
        request: &BusMessage,
        sender: &str,
        payload: serde_json::Value,
    ) -> HiveResult<Uuid> {
        let correlation = request.correlation_id.ok_or_else(|| {
            HiveError::Bus(format!(
                "message {} on '{}' has no correlation id to reply to",
                request.id, request.topic
            ))
        })?;
        self.publish_correlated(sender, &topics::reply(&request.topic), payload, correlation)
    }

    /// Correlation-id round-trip: publish on `topic`, await the correlated
    /// reply on the reply topic, return its payload.
    pub async fn request(
        &self,
        sender: &str,
        topic: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> HiveResult<serde_json::Value> {
        let correlation = Uuid::new_v4();
        // Subscribe before publishing so the reply cannot race the window.
        let sub = self.subscribe(&topics::reply(topic))?;
        self.publish_correlated(sender, topic, payload, correlation)?;

        let wait = async {
            loop {
                match sub.recv().await {
                    Some(msg) if msg.correlation_id == Some(correlation) => return Ok(msg.payload),
                    Some(_) => continue,
                    None => return Err(HiveError::Bus("subscription closed".into())),
                }
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(HiveError::Timeout(format!(
                "no reply on '{topic}' within {timeout:?}"
            ))),
        }
    }

    /// Last `n` messages observed on `topic`, oldest first, from the
    /// bounded history buffer.
    pub fn history(&self, topic: &str, n: usize) -> Vec<BusMessage> {
        let state = self.shared.state.lock().expect("bus state poisoned");
        let matching: Vec<BusMessage> = state
            .history
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(n);
        matching.into_iter().skip(skip).collect()
    }

    pub fn stats(&self) -> BusStats {
        let state = self.shared.state.lock().expect("bus state poisoned");
        let dropped = state
            .subs
            .values()
            .map(|e| e.queue.dropped.load(Ordering::Relaxed))
            .sum();
        BusStats {
            topics: state.published.clone(),
            subscriptions: state.subs.len(),
            dropped,
            history_len: state.history.len(),
        }
    }

    fn unsubscribe_id(&self, id: u64) {
        let entry = {
            let mut state = self.shared.state.lock().expect("bus state poisoned");
            state.subs.remove(&id)
        };
        if let Some(entry) = entry {
            entry.queue.close();
        }
    }
}

/// Per-topic publish counts and delivery health.
#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub topics: HashMap<String, u64>,
    pub subscriptions: usize,
    /// Messages dropped to overflow across all live subscriptions.
    pub dropped: u64,
    pub history_len: usize,
}

/// Receiving half of a subscription. Messages arrive in per-sender,
/// per-topic publish order.
pub struct Subscription {
    id: u64,
    queue: Arc<SubQueue>,
    bus: Bus,
}

impl Subscription {
    /// Await the next message; `None` after the subscription is closed and
    /// drained.
    pub async fn recv(&self) -> Option<BusMessage> {
        loop {
            if let Some(msg) = self.queue.inner.lock().expect("subscription queue poisoned").pop_front()
            {
                return Some(msg);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Non-blocking poll.
    pub fn try_recv(&self) -> Option<BusMessage> {
        self.queue
            .inner
            .lock()
            .expect("subscription queue poisoned")
            .pop_front()
    }

    /// Messages this subscription lost to queue overflow.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe_id(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small_bus(depth: usize) -> Bus {
        Bus::new(BusConfig {
            queue_depth: depth,
            history_limit: 16,
            request_timeout: Duration::from_secs(1),
        })
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = small_bus(8);
        let sub = bus.subscribe("agent.*.result").unwrap();

        bus.publish("r1", "agent.r1.result", json!({"n": 1})).unwrap();
        bus.publish("r1", "other.topic", json!({"n": 2})).unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.topic, "agent.r1.result");
        assert_eq!(msg.payload["n"], 1);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_per_sender_fifo() {
        let bus = small_bus(32);
        let sub = bus.subscribe("work.items").unwrap();
        for n in 0..10 {
            bus.publish("p1", "work.items", json!({ "n": n })).unwrap();
        }
        for n in 0..10 {
            let msg = sub.recv().await.unwrap();
            assert_eq!(msg.payload["n"], n);
        }
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let bus = small_bus(3);
        let sub = bus.subscribe("flood").unwrap();
        for n in 0..5 {
            bus.publish("p", "flood", json!({ "n": n })).unwrap();
        }

        assert_eq!(sub.dropped(), 2);
        // Surviving suffix is still FIFO: 2, 3, 4.
        for n in 2..5 {
            assert_eq!(sub.recv().await.unwrap().payload["n"], n);
        }
        assert_eq!(bus.stats().dropped, 2);
    }

    #[tokio::test]
    async fn test_fanout_to_multiple_subscribers() {
        let bus = small_bus(8);
        let a = bus.subscribe("news.#").unwrap();
        let b = bus.subscribe("news.sports").unwrap();

        bus.publish("p", "news.sports", json!("goal")).unwrap();
        assert_eq!(a.recv().await.unwrap().payload, json!("goal"));
        assert_eq!(b.recv().await.unwrap().payload, json!("goal"));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = small_bus(8);
        let sub = bus.subscribe("t.x").unwrap();
        sub.unsubscribe();
        bus.publish("p", "t.x", json!(1)).unwrap();
        assert_eq!(bus.stats().subscriptions, 0);
    }

    #[tokio::test]
    async fn test_request_reply() {
        let bus = small_bus(8);
        let server = bus.subscribe("svc.echo").unwrap();
        let server_bus = bus.clone();
        tokio::spawn(async move {
            while let Some(req) = server.recv().await {
                let payload = json!({ "echo": req.payload });
                server_bus.respond(&req, "svc", payload).unwrap();
            }
        });

        let reply = bus
            .request("client", "svc.echo", json!("hello"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, json!({ "echo": "hello" }));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let bus = small_bus(8);
        let err = bus
            .request("client", "svc.void", json!(null), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, HiveError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_concurrent_requests_correlate() {
        let bus = small_bus(32);
        let server = bus.subscribe("svc.double").unwrap();
        let server_bus = bus.clone();
        tokio::spawn(async move {
            while let Some(req) = server.recv().await {
                let n = req.payload.as_i64().unwrap();
                server_bus.respond(&req, "svc", json!(n * 2)).unwrap();
            }
        });

        let mut handles = Vec::new();
        for n in 0..8i64 {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                bus.request("c", "svc.double", json!(n), Duration::from_secs(1))
                    .await
                    .unwrap()
            }));
        }
        for (n, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), json!(n as i64 * 2));
        }
    }

    #[tokio::test]
    async fn test_history_and_stats() {
        let bus = small_bus(8);
        for n in 0..4 {
            bus.publish("p", "metrics.cpu", json!(n)).unwrap();
        }
        bus.publish("p", "metrics.mem", json!(0)).unwrap();

        let history = bus.history("metrics.cpu", 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].payload, json!(2));
        assert_eq!(history[1].payload, json!(3));

        let stats = bus.stats();
        assert_eq!(stats.topics["metrics.cpu"], 4);
        assert_eq!(stats.topics["metrics.mem"], 1);
    }

    #[tokio::test]
    async fn test_publish_rejects_wildcard_topic() {
        let bus = small_bus(8);
        assert!(bus.publish("p", "a.*.b", json!(null)).is_err());
    }
}
