use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

/// Identifies one live websocket connection (`conn_<ulid>`).
pub type ConnectionId = String;

/// An encoded envelope shared by every recipient of one broadcast.
pub type Frame = Arc<str>;

/// Why the hub gave up on a subscriber.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriberFailure {
    #[error("outbound buffer full")]
    BufferFull,
    #[error("connection closed")]
    Closed,
}

/// The hub's handle on one connection: the sending half of its bounded
/// outbound buffer.
///
/// Dropping the subscriber closes the buffer, which makes the connection's
/// writer close the socket. The hub owns every registered subscriber, so a
/// connection is closed exactly when its registry entry goes away.
#[derive(Debug)]
pub struct Subscriber {
    pub id: ConnectionId,
    pub member_id: i32,
    outbound: mpsc::Sender<Frame>,
}

impl Subscriber {
    /// Creates a subscriber and the receiving end its writer drains.
    pub fn channel(
        id: ConnectionId,
        member_id: i32,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id,
                member_id,
                outbound,
            },
            rx,
        )
    }

    /// Queues `frame` without waiting.
    pub fn offer(&self, frame: &Frame) -> Result<(), SubscriberFailure> {
        self.outbound
            .try_send(Arc::clone(frame))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SubscriberFailure::BufferFull,
                mpsc::error::TrySendError::Closed(_) => SubscriberFailure::Closed,
            })
    }
}
