use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gridproto::frame::{
    CONTROL_JOIN, CONTROL_LEAVE, DATA_TYPE_CONTROL, HEADER_SIZE, PAYLOAD_HEADER_SIZE,
    parse_payload_header,
};
use gridproto::room::RoomId;
use gridproto::session::SessionId;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::CoreError;
use crate::pubsub::{Message, PubSub, Subscription, Topic};
use std::sync::Arc;

/// Default tick rate: 60 Hz.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_micros(16_667);

const SEND_QUEUE_CAPACITY: usize = 1024;

/// Per-tick application logic hosted by a room. The core treats
/// `handle_message` as opaque and broadcasts whatever `tick` returns.
#[async_trait]
pub trait Application: Send {
    async fn handle_message(&mut self, session_id: SessionId, data: &[u8]) -> anyhow::Result<()>;

    fn tick(&mut self) -> Option<Bytes>;
}

enum RoomSend {
    Broadcast(Bytes),
    To(SessionId, Bytes),
}

/// Cheap clone handed to producers; enqueues never block.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    send_tx: mpsc::Sender<RoomSend>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn enqueue_broadcast(&self, data: Bytes) -> Result<(), CoreError> {
        self.send_tx
            .try_send(RoomSend::Broadcast(data))
            .map_err(|_| CoreError::RoomBusy)
    }

    pub fn enqueue_send_to(&self, session_id: SessionId, data: Bytes) -> Result<(), CoreError> {
        self.send_tx
            .try_send(RoomSend::To(session_id, data))
            .map_err(|_| CoreError::RoomBusy)
    }
}

/// Tick-scheduled actor owning a membership set and an application.
///
/// Membership is read and mutated only from the tick path, in response to
/// Control/Join and Control/Leave frames drained from the room inbox; nothing
/// else touches the set, so it needs no lock. Outbound messages enqueued
/// during tick N are delivered when tick N+1 drains the send queue.
pub struct Room {
    id: RoomId,
    sessions: HashSet<SessionId>,
    pubsub: Arc<PubSub>,
    application: Box<dyn Application>,
    inbox: Subscription,
    send_rx: mpsc::Receiver<RoomSend>,
    send_tx: mpsc::Sender<RoomSend>,
    tick_interval: Duration,
}

impl Room {
    /// Creates the room and subscribes its inbox, so frames published to
    /// `room:<id>` are buffered from this point on even before `run` starts.
    pub fn new(id: RoomId, pubsub: Arc<PubSub>, application: Box<dyn Application>) -> Self {
        let inbox = pubsub.subscribe(Topic::room(id));
        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        Self {
            id,
            sessions: HashSet::new(),
            pubsub,
            application,
            inbox,
            send_rx,
            send_tx,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn handle(&self) -> RoomHandle {
        RoomHandle {
            room_id: self.id,
            send_tx: self.send_tx.clone(),
        }
    }

    pub fn member_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_member(&self, session_id: SessionId) -> bool {
        self.sessions.contains(&session_id)
    }

    /// Drives the room until the token is cancelled. Used by the parallel
    /// host; the single-loop scheduler calls `tick_once` directly instead.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(room = %self.id, "room running");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.pubsub.unsubscribe(&Topic::room(self.id), self.inbox.id());
                    info!(room = %self.id, "room stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick_once(&cancel).await;
                }
            }
        }
    }

    /// One tick: drain the inbox, drain the send queue, then advance the
    /// application. Inbox messages are fully applied before any outbound
    /// work, so the application observes a consistent membership snapshot.
    pub async fn tick_once(&mut self, cancel: &CancellationToken) {
        while let Ok(msg) = self.inbox.try_recv() {
            self.apply_control(&msg);
            if let Err(err) = self.application.handle_message(msg.session_id, &msg.data).await {
                warn!(room = %self.id, session = %msg.session_id, err = %err, "application rejected message");
            }
        }

        while let Ok(send) = self.send_rx.try_recv() {
            match send {
                RoomSend::Broadcast(data) => self.broadcast(cancel, data),
                RoomSend::To(session_id, data) => self.send_to(cancel, session_id, data),
            }
        }

        if let Some(data) = self.application.tick() {
            self.broadcast(cancel, data);
        }
    }

    /// Control/Join adds the origin session to the membership set,
    /// Control/Leave removes it; every other frame leaves membership alone.
    fn apply_control(&mut self, msg: &Message) {
        if msg.data.len() < HEADER_SIZE + PAYLOAD_HEADER_SIZE {
            return;
        }
        let Ok(payload) = parse_payload_header(&msg.data[HEADER_SIZE..]) else {
            return;
        };
        if payload.data_type != DATA_TYPE_CONTROL {
            return;
        }
        match payload.sub_type {
            CONTROL_JOIN => {
                self.sessions.insert(msg.session_id);
                info!(room = %self.id, session = %msg.session_id, "session joined");
            }
            CONTROL_LEAVE => {
                self.sessions.remove(&msg.session_id);
                info!(room = %self.id, session = %msg.session_id, "session left");
            }
            other => {
                debug!(room = %self.id, sub_type = other, "ignoring control sub type");
            }
        }
    }

    fn broadcast(&self, cancel: &CancellationToken, data: Bytes) {
        for sid in &self.sessions {
            self.pubsub.publish(
                cancel,
                &Topic::session(*sid),
                Message {
                    session_id: *sid,
                    data: data.clone(),
                },
            );
        }
    }

    fn send_to(&self, cancel: &CancellationToken, session_id: SessionId, data: Bytes) {
        self.pubsub.publish(
            cancel,
            &Topic::session(session_id),
            Message {
                session_id,
                data: data.clone(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridproto::frame::encode_control;

    use std::sync::Mutex;

    /// Records what the room forwards and can emit a canned tick payload.
    struct RecordingApp {
        seen: Arc<Mutex<Vec<(SessionId, Bytes)>>>,
        tick_payload: Option<Bytes>,
    }

    impl RecordingApp {
        fn new() -> Self {
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
                tick_payload: None,
            }
        }

        fn seen(&self) -> Arc<Mutex<Vec<(SessionId, Bytes)>>> {
            self.seen.clone()
        }
    }

    #[async_trait]
    impl Application for RecordingApp {
        async fn handle_message(&mut self, session_id: SessionId, data: &[u8]) -> anyhow::Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push((session_id, Bytes::copy_from_slice(data)));
            Ok(())
        }

        fn tick(&mut self) -> Option<Bytes> {
            self.tick_payload.take()
        }
    }

    fn publish_frame(pubsub: &PubSub, room_id: RoomId, sid: SessionId, data: Bytes) {
        pubsub.publish(
            &CancellationToken::new(),
            &Topic::room(room_id),
            Message {
                session_id: sid,
                data,
            },
        );
    }

    #[tokio::test]
    async fn join_and_leave_drive_membership() {
        let pubsub = Arc::new(PubSub::new());
        let room_id = RoomId::generate();
        let mut room = Room::new(room_id, pubsub.clone(), Box::new(RecordingApp::new()));
        let cancel = CancellationToken::new();
        let sid = SessionId::generate();

        publish_frame(&pubsub, room_id, sid, encode_control(sid, 0, CONTROL_JOIN));
        room.tick_once(&cancel).await;
        assert!(room.is_member(sid));
        assert_eq!(room.member_count(), 1);

        publish_frame(&pubsub, room_id, sid, encode_control(sid, 1, CONTROL_LEAVE));
        room.tick_once(&cancel).await;
        assert!(!room.is_member(sid));
        assert_eq!(room.member_count(), 0);
    }

    #[tokio::test]
    async fn inbox_preserves_single_sender_order() {
        let pubsub = Arc::new(PubSub::new());
        let room_id = RoomId::generate();
        let app = RecordingApp::new();
        let seen = app.seen();
        let mut room = Room::new(room_id, pubsub.clone(), Box::new(app));
        let cancel = CancellationToken::new();
        let sid = SessionId::generate();

        for seq in 0..3u8 {
            publish_frame(&pubsub, room_id, sid, Bytes::from(vec![seq]));
        }
        room.tick_once(&cancel).await;

        // Short frames never mutate membership but are still forwarded.
        let seen: Vec<u8> = seen.lock().unwrap().iter().map(|(_, d)| d[0]).collect();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_members_next_tick() {
        let pubsub = Arc::new(PubSub::new());
        let room_id = RoomId::generate();
        let mut room = Room::new(room_id, pubsub.clone(), Box::new(RecordingApp::new()));
        let cancel = CancellationToken::new();

        let a = SessionId::generate();
        let b = SessionId::generate();
        let mut sub_a = pubsub.subscribe(Topic::session(a));
        let mut sub_b = pubsub.subscribe(Topic::session(b));

        publish_frame(&pubsub, room_id, a, encode_control(a, 0, CONTROL_JOIN));
        publish_frame(&pubsub, room_id, b, encode_control(b, 0, CONTROL_JOIN));
        room.tick_once(&cancel).await;

        let handle = room.handle();
        handle.enqueue_broadcast(Bytes::from_static(b"X")).unwrap();

        // Not delivered until a tick drains the send queue.
        assert!(sub_a.try_recv().is_err());
        room.tick_once(&cancel).await;

        assert_eq!(sub_a.recv().await.unwrap().data.as_ref(), b"X");
        assert_eq!(sub_b.recv().await.unwrap().data.as_ref(), b"X");
    }

    #[tokio::test]
    async fn send_to_targets_one_member() {
        let pubsub = Arc::new(PubSub::new());
        let room_id = RoomId::generate();
        let mut room = Room::new(room_id, pubsub.clone(), Box::new(RecordingApp::new()));
        let cancel = CancellationToken::new();

        let a = SessionId::generate();
        let b = SessionId::generate();
        let mut sub_a = pubsub.subscribe(Topic::session(a));
        let mut sub_b = pubsub.subscribe(Topic::session(b));

        room.handle()
            .enqueue_send_to(a, Bytes::from_static(b"only-a"))
            .unwrap();
        room.tick_once(&cancel).await;

        assert_eq!(sub_a.recv().await.unwrap().data.as_ref(), b"only-a");
        assert!(sub_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_send_queue_reports_busy() {
        let pubsub = Arc::new(PubSub::new());
        let room = Room::new(RoomId::generate(), pubsub, Box::new(RecordingApp::new()));
        let handle = room.handle();

        for _ in 0..SEND_QUEUE_CAPACITY {
            handle.enqueue_broadcast(Bytes::from_static(b"x")).unwrap();
        }
        assert!(matches!(
            handle.enqueue_broadcast(Bytes::from_static(b"x")),
            Err(CoreError::RoomBusy)
        ));
    }

    #[tokio::test]
    async fn application_tick_output_is_broadcast() {
        let pubsub = Arc::new(PubSub::new());
        let room_id = RoomId::generate();
        let mut app = RecordingApp::new();
        app.tick_payload = Some(Bytes::from_static(b"state"));
        let mut room = Room::new(room_id, pubsub.clone(), Box::new(app));
        let cancel = CancellationToken::new();

        let sid = SessionId::generate();
        let mut sub = pubsub.subscribe(Topic::session(sid));
        publish_frame(&pubsub, room_id, sid, encode_control(sid, 0, CONTROL_JOIN));

        room.tick_once(&cancel).await;
        assert_eq!(sub.recv().await.unwrap().data.as_ref(), b"state");
    }
}
