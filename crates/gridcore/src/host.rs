use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use gridproto::room::RoomId;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::pubsub::PubSub;
use crate::room::{Application, DEFAULT_TICK_INTERVAL, Room, RoomHandle};

/// Builds one application instance per room.
pub type ApplicationFactory = Arc<dyn Fn(RoomId) -> Box<dyn Application> + Send + Sync>;

/// Parallel mode: each room gets its own tick task, spawned on first demand.
pub struct ParallelHost {
    pubsub: Arc<PubSub>,
    factory: ApplicationFactory,
    tick_interval: Duration,
    cancel: CancellationToken,
    rooms: StdMutex<HashMap<RoomId, RoomHandle>>,
}

impl ParallelHost {
    pub fn new(pubsub: Arc<PubSub>, factory: ApplicationFactory) -> Self {
        Self {
            pubsub,
            factory,
            tick_interval: DEFAULT_TICK_INTERVAL,
            cancel: CancellationToken::new(),
            rooms: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Returns the room's handle, creating and spawning the room on first
    /// demand. The room subscribes its inbox before this returns, so a join
    /// published right after is not lost.
    pub fn ensure_room(&self, room_id: RoomId) -> RoomHandle {
        let mut rooms = self.rooms.lock().expect("host lock poisoned");
        if let Some(handle) = rooms.get(&room_id) {
            return handle.clone();
        }
        let room = Room::new(room_id, self.pubsub.clone(), (self.factory)(room_id))
            .with_tick_interval(self.tick_interval);
        let handle = room.handle();
        rooms.insert(room_id, handle.clone());
        info!(room = %room_id, "spawning room tick task");
        tokio::spawn(room.run(self.cancel.child_token()));
        handle
    }

    pub fn room_handle(&self, room_id: RoomId) -> Option<RoomHandle> {
        self.rooms
            .lock()
            .expect("host lock poisoned")
            .get(&room_id)
            .cloned()
    }

    /// Cancels every room task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Single-loop mode: one scheduler drives all rooms sequentially per tick.
/// Contention is eliminated by construction; the trade-off is that one slow
/// room delays every other room's tick.
pub struct SingleLoopScheduler {
    pubsub: Arc<PubSub>,
    factory: ApplicationFactory,
    tick_interval: Duration,
    cancel: CancellationToken,
    rooms: tokio::sync::Mutex<Vec<Room>>,
    handles: StdMutex<HashMap<RoomId, RoomHandle>>,
}

impl SingleLoopScheduler {
    pub fn new(pubsub: Arc<PubSub>, factory: ApplicationFactory) -> Self {
        Self {
            pubsub,
            factory,
            tick_interval: DEFAULT_TICK_INTERVAL,
            cancel: CancellationToken::new(),
            rooms: tokio::sync::Mutex::new(Vec::new()),
            handles: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Returns the room's handle, adding the room to the schedule on first
    /// demand.
    pub async fn ensure_room(&self, room_id: RoomId) -> RoomHandle {
        if let Some(handle) = self
            .handles
            .lock()
            .expect("scheduler lock poisoned")
            .get(&room_id)
        {
            return handle.clone();
        }
        let room = Room::new(room_id, self.pubsub.clone(), (self.factory)(room_id));
        let handle = room.handle();
        self.handles
            .lock()
            .expect("scheduler lock poisoned")
            .insert(room_id, handle.clone());
        self.rooms.lock().await.push(room);
        info!(room = %room_id, "room added to single-loop schedule");
        handle
    }

    pub fn room_handle(&self, room_id: RoomId) -> Option<RoomHandle> {
        self.handles
            .lock()
            .expect("scheduler lock poisoned")
            .get(&room_id)
            .cloned()
    }

    /// Drives all rooms until shutdown. One timer, strictly sequential room
    /// ticks.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("single-loop scheduler running");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("single-loop scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let mut rooms = self.rooms.lock().await;
                    for room in rooms.iter_mut() {
                        room.tick_once(&self.cancel).await;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use gridproto::session::SessionId;

    struct NoopApp;

    #[async_trait]
    impl Application for NoopApp {
        async fn handle_message(&mut self, _sid: SessionId, _data: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }

        fn tick(&mut self) -> Option<Bytes> {
            None
        }
    }

    fn factory() -> ApplicationFactory {
        Arc::new(|_room_id| Box::new(NoopApp) as Box<dyn Application>)
    }

    #[tokio::test]
    async fn parallel_host_reuses_rooms() {
        let host = ParallelHost::new(Arc::new(PubSub::new()), factory());
        let rid = RoomId::generate();
        let a = host.ensure_room(rid);
        let b = host.ensure_room(rid);
        assert_eq!(a.room_id(), b.room_id());
        assert!(host.room_handle(rid).is_some());
        assert!(host.room_handle(RoomId::generate()).is_none());
        host.shutdown();
    }

    #[tokio::test]
    async fn scheduler_registers_rooms_once() {
        let sched = SingleLoopScheduler::new(Arc::new(PubSub::new()), factory());
        let rid = RoomId::generate();
        sched.ensure_room(rid).await;
        sched.ensure_room(rid).await;
        assert_eq!(sched.rooms.lock().await.len(), 1);
        sched.shutdown();
    }
}
