//! Broadcast hub: the single owner of the subscriber registry.
//!
//! Registration, deregistration and fan-out are all serialized through one
//! task. Handlers submit through a cloneable [`HubHandle`] and never wait on
//! delivery.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::events::ChangeEvent;
use super::subscriber::{ConnectionId, Frame, Subscriber};
use crate::config::Config;

/// Membership changes applied back to back before one waiting broadcast is
/// let through. Bounds how long fan-out can lag behind connection churn.
pub const MEMBERSHIP_BURST: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Events that may wait for the hub loop before submissions are dropped.
    pub broadcast_queue: usize,
}

impl From<&Config> for HubConfig {
    fn from(config: &Config) -> Self {
        Self {
            broadcast_queue: config.hub_broadcast_queue,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast_queue: 4096,
        }
    }
}

/// Submission side of the hub. Cheap to clone; store it in `AppState`.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<Subscriber>,
    unregister_tx: mpsc::UnboundedSender<ConnectionId>,
    broadcast_tx: mpsc::Sender<ChangeEvent>,
    count_tx: mpsc::UnboundedSender<oneshot::Sender<usize>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl HubHandle {
    /// Hands a connection to the hub. If the hub has stopped the subscriber
    /// is dropped, which closes the connection.
    pub fn register(&self, subscriber: Subscriber) {
        if let Err(rejected) = self.register_tx.send(subscriber) {
            tracing::debug!(conn_id = %rejected.0.id, "hub stopped; registration refused");
        }
    }

    /// Removes a connection. Unknown or already removed ids are ignored.
    pub fn unregister(&self, id: &str) {
        let _ = self.unregister_tx.send(id.to_string());
    }

    /// Submits an event for fan-out without waiting. When the submission
    /// queue is full the event is dropped.
    pub fn broadcast(&self, event: ChangeEvent) {
        match self.broadcast_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(kind = %event.kind(), "broadcast queue full; event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!(kind = %event.kind(), "hub stopped; event dropped");
            }
        }
    }

    /// Number of registered subscribers once every earlier submission from
    /// this handle has been processed. Zero after the hub stopped.
    pub async fn connection_count(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.count_tx.send(reply_tx).is_err() {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }

    /// Asks the hub loop to exit and close every connection.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

pub struct Hub {
    registry: HashMap<ConnectionId, Subscriber>,
    register_rx: mpsc::UnboundedReceiver<Subscriber>,
    unregister_rx: mpsc::UnboundedReceiver<ConnectionId>,
    broadcast_rx: mpsc::Receiver<ChangeEvent>,
    count_rx: mpsc::UnboundedReceiver<oneshot::Sender<usize>>,
    shutdown_rx: watch::Receiver<bool>,
    membership_streak: usize,
}

impl Hub {
    /// Spawns the hub loop on the current runtime.
    pub fn start(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_queue.max(1));
        let (count_tx, count_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let hub = Hub {
            registry: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            count_rx,
            shutdown_rx,
            membership_streak: 0,
        };
        let task = tokio::spawn(hub.run());

        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            count_tx,
            shutdown_tx: Arc::new(shutdown_tx),
        };
        (handle, task)
    }

    async fn run(mut self) {
        tracing::info!("broadcast hub started");

        // Membership changes are applied before fan-out, so an unregister
        // submitted ahead of a broadcast is honoured first, except that a
        // broadcast never waits behind more than MEMBERSHIP_BURST of them.
        // Count queries go last and observe everything queued before them.
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => break,
                Some(subscriber) = self.register_rx.recv() => {
                    self.register(subscriber);
                    self.after_membership_change();
                }
                Some(id) = self.unregister_rx.recv() => {
                    self.unregister(&id);
                    self.after_membership_change();
                }
                Some(event) = self.broadcast_rx.recv() => {
                    self.membership_streak = 0;
                    self.fan_out(event);
                }
                Some(reply) = self.count_rx.recv() => {
                    self.membership_streak = 0;
                    let _ = reply.send(self.registry.len());
                }
                else => break,
            }
        }

        let closed = self.registry.len();
        self.registry.clear();
        tracing::info!(closed, "broadcast hub stopped");
    }

    fn register(&mut self, subscriber: Subscriber) {
        if self.registry.contains_key(&subscriber.id) {
            tracing::debug!(conn_id = %subscriber.id, "already registered; keeping existing entry");
            return;
        }
        tracing::debug!(
            conn_id = %subscriber.id,
            member_id = subscriber.member_id,
            total = self.registry.len() + 1,
            "subscriber registered"
        );
        self.registry.insert(subscriber.id.clone(), subscriber);
    }

    fn unregister(&mut self, id: &str) {
        if self.registry.remove(id).is_some() {
            tracing::debug!(conn_id = %id, total = self.registry.len(), "subscriber unregistered");
        }
    }

    fn after_membership_change(&mut self) {
        self.membership_streak += 1;
        if self.membership_streak < MEMBERSHIP_BURST {
            return;
        }
        self.membership_streak = 0;
        if let Ok(event) = self.broadcast_rx.try_recv() {
            self.fan_out(event);
        }
    }

    fn fan_out(&mut self, event: ChangeEvent) {
        let kind = event.kind();
        let frame: Frame = match event.encode() {
            Ok(text) => Arc::from(text),
            Err(err) => {
                tracing::error!(%kind, ?err, "failed to encode change event; dropped");
                return;
            }
        };

        let mut delivered = 0usize;
        self.registry.retain(|id, subscriber| match subscriber.offer(&frame) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(failure) => {
                tracing::warn!(
                    conn_id = %id,
                    member_id = subscriber.member_id,
                    %failure,
                    %kind,
                    "dropping subscriber"
                );
                false
            }
        });

        tracing::debug!(%kind, delivered, "change event fanned out");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use eskimoe_common::{BroadcastType, Envelope};
    use serde_json::Value;
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    fn role_deleted(role_id: i32) -> ChangeEvent {
        ChangeEvent::RoleDeleted { role_id }
    }

    async fn next_envelope(rx: &mut mpsc::Receiver<Frame>) -> Envelope<Value> {
        let frame = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("subscriber closed");
        serde_json::from_str(&frame).unwrap()
    }

    async fn assert_closed(rx: &mut mpsc::Receiver<Frame>) {
        let next = timeout(WAIT, rx.recv()).await.expect("timed out");
        assert!(next.is_none(), "expected closed stream, got {next:?}");
    }

    fn subscribe(handle: &HubHandle, id: &str, capacity: usize) -> mpsc::Receiver<Frame> {
        let (subscriber, rx) = Subscriber::channel(id.to_string(), 1, capacity);
        handle.register(subscriber);
        rx
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let (hub, _task) = Hub::start(HubConfig::default());
        let mut a = subscribe(&hub, "conn_a", 8);
        let mut b = subscribe(&hub, "conn_b", 8);
        assert_eq!(hub.connection_count().await, 2);

        hub.broadcast(role_deleted(5));

        for rx in [&mut a, &mut b] {
            let envelope = next_envelope(rx).await;
            assert_eq!(envelope.broadcast_type, BroadcastType::RoleDeleted);
            assert_eq!(envelope.data["role_id"], 5);
        }
    }

    #[tokio::test]
    async fn severed_subscriber_is_removed_and_others_keep_receiving() {
        let (hub, _task) = Hub::start(HubConfig::default());
        let mut a = subscribe(&hub, "conn_a", 8);
        let severed = subscribe(&hub, "conn_b", 8);
        let mut c = subscribe(&hub, "conn_c", 8);
        drop(severed);

        hub.broadcast(role_deleted(1));
        assert_eq!(next_envelope(&mut a).await.data["role_id"], 1);
        assert_eq!(next_envelope(&mut c).await.data["role_id"], 1);
        assert_eq!(hub.connection_count().await, 2);

        hub.broadcast(role_deleted(2));
        assert_eq!(next_envelope(&mut a).await.data["role_id"], 2);
        assert_eq!(next_envelope(&mut c).await.data["role_id"], 2);
        assert_eq!(hub.connection_count().await, 2);
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_disconnected() {
        let (hub, _task) = Hub::start(HubConfig::default());
        let mut slow = subscribe(&hub, "conn_slow", 1);
        let mut fast = subscribe(&hub, "conn_fast", 8);

        hub.broadcast(role_deleted(1));
        hub.broadcast(role_deleted(2));
        assert_eq!(hub.connection_count().await, 1);

        // The slow reader keeps what was buffered, then sees the close.
        assert_eq!(next_envelope(&mut slow).await.data["role_id"], 1);
        assert_closed(&mut slow).await;
        assert_eq!(next_envelope(&mut fast).await.data["role_id"], 1);
        assert_eq!(next_envelope(&mut fast).await.data["role_id"], 2);
    }

    #[tokio::test]
    async fn unregister_closes_once_and_repeats_are_noops() {
        let (hub, _task) = Hub::start(HubConfig::default());
        let mut a = subscribe(&hub, "conn_a", 8);
        let mut b = subscribe(&hub, "conn_b", 8);

        hub.unregister("conn_a");
        hub.unregister("conn_a");
        hub.unregister("conn_unknown");
        assert_eq!(hub.connection_count().await, 1);
        assert_closed(&mut a).await;

        hub.broadcast(role_deleted(9));
        assert_eq!(next_envelope(&mut b).await.data["role_id"], 9);
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_original() {
        let (hub, _task) = Hub::start(HubConfig::default());
        let mut original = subscribe(&hub, "conn_a", 8);
        let mut duplicate = subscribe(&hub, "conn_a", 8);
        assert_eq!(hub.connection_count().await, 1);
        assert_closed(&mut duplicate).await;

        hub.broadcast(role_deleted(3));
        assert_eq!(next_envelope(&mut original).await.data["role_id"], 3);
    }

    #[tokio::test]
    async fn stop_closes_all_connections() {
        let (hub, task) = Hub::start(HubConfig::default());
        let mut a = subscribe(&hub, "conn_a", 8);
        let mut b = subscribe(&hub, "conn_b", 8);
        assert_eq!(hub.connection_count().await, 2);

        hub.stop();
        timeout(WAIT, task).await.expect("hub did not stop").unwrap();

        assert_closed(&mut a).await;
        assert_closed(&mut b).await;
        assert_eq!(hub.connection_count().await, 0);

        // Submissions after shutdown are dropped quietly.
        hub.broadcast(role_deleted(1));
        let late = subscribe(&hub, "conn_late", 8);
        drop(late);
    }

    #[tokio::test]
    async fn broadcast_is_not_starved_by_registration_churn() {
        let (hub, _task) = Hub::start(HubConfig::default());
        let mut first = subscribe(&hub, "conn_first", 8);
        assert_eq!(hub.connection_count().await, 1);

        // Queued without yielding, so the hub sees the whole backlog at once.
        let mut late: Vec<_> = (0..200)
            .map(|n| subscribe(&hub, &format!("conn_{n}"), 8))
            .collect();
        hub.broadcast(role_deleted(7));
        assert_eq!(hub.connection_count().await, 201);

        assert_eq!(next_envelope(&mut first).await.data["role_id"], 7);
        let reached = late
            .iter_mut()
            .map(|rx| rx.try_recv().is_ok())
            .filter(|got| *got)
            .count();
        assert_eq!(reached, MEMBERSHIP_BURST);
    }

    #[tokio::test]
    async fn hub_exits_when_every_handle_is_dropped() {
        let (hub, task) = Hub::start(HubConfig::default());
        drop(hub);
        timeout(WAIT, task).await.expect("hub did not stop").unwrap();
    }
}
