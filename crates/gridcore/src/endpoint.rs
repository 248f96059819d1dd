use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use gridproto::frame::{CONTROL_JOIN, CONTROL_LEAVE, encode_control};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::CoreError;
use crate::connection::Connection;
use crate::pubsub::{Message, PubSub, Subscription, Topic};
use crate::room_manager::RoomManager;
use crate::session::{IdleReason, Session};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

const CTRL_CAPACITY: usize = 16;
const WRITE_CAPACITY: usize = 1024;

/// Lifecycle events crossing loop boundaries. The owner loop is the only
/// consumer and the only authority that may terminate the endpoint.
pub enum EndpointEvent {
    Pong,
    ReadError(std::io::Error),
    WriteError(std::io::Error),
    DispatchError(anyhow::Error),
    Close(Option<IdleReason>),
}

struct LoopChannels {
    ctrl_rx: mpsc::Receiver<EndpointEvent>,
    write_rx: mpsc::Receiver<Bytes>,
}

/// Owns one session + connection pair and drives the four loops that service
/// it: read, write, subscribe (pub/sub -> write channel) and owner (ctrl +
/// idle supervision). Each loop blocks on exactly one source and observes the
/// shared cancellation token, which keeps shutdown simple: the first `close`
/// cancels the token, every loop unwinds, `run` returns.
pub struct SessionEndpoint {
    session: Arc<Session>,
    connection: Arc<Connection>,
    pubsub: Arc<PubSub>,
    room_manager: Arc<dyn RoomManager>,

    cancel: CancellationToken,
    ctrl_tx: mpsc::Sender<EndpointEvent>,
    write_tx: mpsc::Sender<Bytes>,
    loops: StdMutex<Option<LoopChannels>>,

    closed: AtomicBool,
    seq: AtomicU32,
    idle_timeout: Duration,
    idle_check_interval: Duration,
}

impl SessionEndpoint {
    pub fn new(
        session: Arc<Session>,
        connection: Arc<Connection>,
        pubsub: Arc<PubSub>,
        room_manager: Arc<dyn RoomManager>,
    ) -> Self {
        let (ctrl_tx, ctrl_rx) = mpsc::channel(CTRL_CAPACITY);
        let (write_tx, write_rx) = mpsc::channel(WRITE_CAPACITY);
        Self {
            session,
            connection,
            pubsub,
            room_manager,
            cancel: CancellationToken::new(),
            ctrl_tx,
            write_tx,
            loops: StdMutex::new(Some(LoopChannels { ctrl_rx, write_rx })),
            closed: AtomicBool::new(false),
            seq: AtomicU32::new(0),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            idle_check_interval: DEFAULT_IDLE_CHECK_INTERVAL,
        }
    }

    /// A timeout of zero disables idle supervision.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Resolves the room, announces the join, then drives all four loops to
    /// completion. Returns once the endpoint has been closed (by `close`,
    /// `force_close` or the idle supervisor) and the leave announcement has
    /// been published.
    pub async fn run(&self) -> Result<(), CoreError> {
        let LoopChannels {
            mut ctrl_rx,
            mut write_rx,
        } = self
            .loops
            .lock()
            .expect("endpoint lock poisoned")
            .take()
            .ok_or(CoreError::AlreadyRunning)?;

        let sid = self.session.id();
        let room_id = self.room_manager.get_room(sid).await?;

        let session_topic = Topic::session(sid);
        let mut sub = self.pubsub.subscribe(session_topic.clone());
        let sub_id = sub.id();

        let room_topic = Topic::room(room_id);
        let ctrl_topic = Topic::room_ctrl(room_id);

        let join = encode_control(sid, self.next_seq(), CONTROL_JOIN);
        self.announce(&self.cancel, &room_topic, &ctrl_topic, join);
        info!(session = %sid, room = %room_id, "endpoint running");

        tokio::join!(
            self.owner_loop(&mut ctrl_rx),
            self.read_loop(&room_topic),
            self.write_loop(&mut write_rx),
            self.subscribe_loop(&mut sub),
        );

        // Teardown runs after the token was cancelled; the leave frame still
        // has to reach the room, so it is published with a fresh token.
        let teardown = CancellationToken::new();
        let leave = encode_control(sid, self.next_seq(), CONTROL_LEAVE);
        self.announce(&teardown, &room_topic, &ctrl_topic, leave);
        self.pubsub.unsubscribe(&session_topic, sub_id);
        info!(session = %sid, room = %room_id, "endpoint stopped");
        Ok(())
    }

    /// Non-blocking enqueue onto the write channel.
    pub fn send(&self, data: Bytes) -> Result<(), CoreError> {
        self.write_tx
            .try_send(data)
            .map_err(|_| CoreError::Backpressure)
    }

    /// Requests an orderly shutdown via the owner loop.
    pub async fn close(&self) {
        self.send_ctrl(EndpointEvent::Close(None)).await;
    }

    /// Immediate teardown: cancel, mark the session closed, close the
    /// connection. Safe to call repeatedly.
    pub async fn force_close(&self) {
        self.close_internal().await;
    }

    /// Reports a transport-level pong so the idle supervisor sees liveness.
    pub async fn pong(&self) {
        self.send_ctrl(EndpointEvent::Pong).await;
    }

    async fn owner_loop(&self, ctrl_rx: &mut mpsc::Receiver<EndpointEvent>) {
        let mut ticker = tokio::time::interval(self.idle_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                ev = ctrl_rx.recv() => {
                    let Some(ev) = ev else { return };
                    self.handle_control_event(ev).await;
                }
                _ = ticker.tick() => {
                    let (idle, reason) = self.session.is_idle(self.idle_timeout);
                    if idle {
                        warn!(session = %self.session.id(), reason = %reason, "session idle, closing");
                        self.handle_control_event(EndpointEvent::Close(Some(reason))).await;
                    }
                }
            }
        }
    }

    async fn read_loop(&self, room_topic: &Topic) {
        let sid = self.session.id();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                res = self.connection.read() => match res {
                    Ok(data) => {
                        self.session.touch_read();
                        self.pubsub.publish(
                            &self.cancel,
                            room_topic,
                            Message { session_id: sid, data },
                        );
                    }
                    Err(err) => {
                        self.send_ctrl(EndpointEvent::ReadError(err)).await;
                    }
                }
            }
        }
    }

    async fn write_loop(&self, write_rx: &mut mpsc::Receiver<Bytes>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                data = write_rx.recv() => {
                    let Some(data) = data else { return };
                    match self.connection.write(&data).await {
                        Ok(()) => self.session.touch_write(),
                        Err(err) => self.send_ctrl(EndpointEvent::WriteError(err)).await,
                    }
                }
            }
        }
    }

    /// Forwards messages from the session topic to the write channel. The
    /// forward is non-blocking: a full write channel drops the message rather
    /// than stalling the fabric behind one slow connection.
    async fn subscribe_loop(&self, sub: &mut Subscription) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                msg = sub.recv() => {
                    let Some(msg) = msg else { return };
                    if self.write_tx.try_send(msg.data).is_err() {
                        warn!(session = %self.session.id(), "write channel full, message dropped");
                    }
                }
            }
        }
    }

    /// The single place that mutates endpoint lifecycle state off ctrl events.
    async fn handle_control_event(&self, ev: EndpointEvent) {
        match ev {
            EndpointEvent::Close(reason) => {
                if let Some(reason) = reason {
                    info!(session = %self.session.id(), reason = %reason, "closing endpoint");
                }
                self.close_internal().await;
            }
            EndpointEvent::Pong => self.session.touch_pong(),
            EndpointEvent::ReadError(err) => {
                debug!(session = %self.session.id(), err = %err, "read error");
            }
            EndpointEvent::WriteError(err) => {
                debug!(session = %self.session.id(), err = %err, "write error");
            }
            EndpointEvent::DispatchError(err) => {
                debug!(session = %self.session.id(), err = %err, "dispatch error");
            }
        }
    }

    async fn close_internal(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.cancel.cancel();
        self.session.close();
        self.connection.close().await;
    }

    async fn send_ctrl(&self, ev: EndpointEvent) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            res = self.ctrl_tx.send(ev) => { let _ = res; }
        }
    }

    fn announce(&self, cancel: &CancellationToken, room_topic: &Topic, ctrl_topic: &Topic, frame: Bytes) {
        let msg = Message {
            session_id: self.session.id(),
            data: frame,
        };
        self.pubsub.publish(cancel, room_topic, msg.clone());
        self.pubsub.publish(cancel, ctrl_topic, msg);
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}
