use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use gridproto::room::RoomId;
use gridproto::session::SessionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default buffer size of a subscriber channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Routing key. Two namespaces are reserved: `session:<sid>` (that session's
/// write path) and `room:<rid>` (that room's inbox); `room:<rid>:ctrl` carries
/// join/leave announcements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn session(sid: SessionId) -> Self {
        Self(format!("session:{sid}"))
    }

    pub fn room(rid: RoomId) -> Self {
        Self(format!("room:{rid}"))
    }

    pub fn room_ctrl(rid: RoomId) -> Self {
        Self(format!("room:{rid}:ctrl"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Envelope delivered through the fabric. The session id is the origin on
/// room topics and the destination on session topics.
#[derive(Debug, Clone)]
pub struct Message {
    pub session_id: SessionId,
    pub data: Bytes,
}

/// One registration returned by `subscribe`. Dropping it without calling
/// `unsubscribe` leaves a dangling sender in the fabric until the next publish
/// notices the closed channel.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.rx.try_recv()
    }
}

struct Registration {
    id: u64,
    tx: mpsc::Sender<Message>,
}

/// In-memory topic fan-out with best-effort delivery: a publish never blocks
/// longer than one `try_send` per subscriber, and a full subscriber simply
/// misses that message.
pub struct PubSub {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<Topic, Vec<Registration>>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subscribers.write().expect("pubsub lock poisoned");
        subs.entry(topic).or_default().push(Registration { id, tx });
        Subscription { id, rx }
    }

    /// Removes one registration and drops its sender, closing the subscriber
    /// channel. Unknown ids are no-ops, so double unsubscribe is harmless.
    pub fn unsubscribe(&self, topic: &Topic, subscriber_id: u64) {
        let mut subs = self.subscribers.write().expect("pubsub lock poisoned");
        if let Some(regs) = subs.get_mut(topic) {
            regs.retain(|r| r.id != subscriber_id);
            if regs.is_empty() {
                subs.remove(topic);
            }
        }
    }

    /// Fans `msg` out to every current subscriber of `topic`. The subscriber
    /// list is snapshotted under the read lock and the lock released before
    /// any send. A cancelled token skips the remaining subscribers.
    pub fn publish(&self, cancel: &CancellationToken, topic: &Topic, msg: Message) {
        let snapshot: Vec<mpsc::Sender<Message>> = {
            let subs = self.subscribers.read().expect("pubsub lock poisoned");
            match subs.get(topic) {
                Some(regs) => regs.iter().map(|r| r.tx.clone()).collect(),
                None => return,
            }
        };

        for tx in snapshot {
            if cancel.is_cancelled() {
                return;
            }
            match tx.try_send(msg.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(topic = %topic, "pub/sub: channel full, message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    // Subscriber went away without unsubscribing; cleanup
                    // happens on its unsubscribe or topic removal.
                }
            }
        }
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(data: &[u8]) -> Message {
        Message {
            session_id: SessionId::NIL,
            data: Bytes::copy_from_slice(data),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let ps = PubSub::new();
        let topic = Topic::new("t");
        let mut a = ps.subscribe(topic.clone());
        let mut b = ps.subscribe(topic.clone());

        ps.publish(&CancellationToken::new(), &topic, msg(b"hello"));

        assert_eq!(a.recv().await.unwrap().data.as_ref(), b"hello");
        assert_eq!(b.recv().await.unwrap().data.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn unsubscribe_closes_channel_and_stops_delivery() {
        let ps = PubSub::new();
        let topic = Topic::new("t");
        let mut sub = ps.subscribe(topic.clone());

        ps.unsubscribe(&topic, sub.id());
        assert!(sub.recv().await.is_none());

        // Second unsubscribe with the same id is a no-op.
        ps.unsubscribe(&topic, sub.id());

        // Topic entry was removed; publishing to it goes nowhere.
        ps.publish(&CancellationToken::new(), &topic, msg(b"x"));
    }

    #[tokio::test]
    async fn full_subscriber_drops_without_blocking_others() {
        let ps = PubSub::with_capacity(1);
        let topic = Topic::new("t");
        let mut slow = ps.subscribe(topic.clone());
        let mut fast = ps.subscribe(topic.clone());

        let cancel = CancellationToken::new();
        ps.publish(&cancel, &topic, msg(b"1"));
        assert_eq!(fast.recv().await.unwrap().data.as_ref(), b"1");

        ps.publish(&cancel, &topic, msg(b"2")); // slow still holds "1": full

        assert_eq!(fast.recv().await.unwrap().data.as_ref(), b"2");
        assert_eq!(slow.recv().await.unwrap().data.as_ref(), b"1");
        assert!(slow.try_recv().is_err()); // "2" was dropped for the slow one
    }

    #[tokio::test]
    async fn cancelled_publish_skips_subscribers() {
        let ps = PubSub::new();
        let topic = Topic::new("t");
        let mut sub = ps.subscribe(topic.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        ps.publish(&cancel, &topic, msg(b"x"));

        assert!(sub.try_recv().is_err());
    }
}
