use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;

use crate::command::{
    AttackCommand, AttackResult, BuffCommand, BuffResult, MoveCommand, MoveResult, TradeCommand,
    TradeResult,
};
use crate::metrics::MetricsRecorder;
use crate::store::{InteractionState, StateError, WorldState};

/// Shared-state store: one reader/writer lock around the rulebook, held for
/// the whole body of every mutation. This is the contention baseline the
/// single-loop store is measured against.
pub struct ParallelStore {
    inner: RwLock<WorldState>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl ParallelStore {
    pub fn new(metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            inner: RwLock::new(WorldState::new()),
            metrics,
        }
    }

    fn locked(&self, endpoint: &'static str) -> std::sync::RwLockWriteGuard<'_, WorldState> {
        let waited = Instant::now();
        let guard = self.inner.write().expect("state lock poisoned");
        self.metrics.record_contention(endpoint, waited.elapsed());
        guard
    }
}

#[async_trait]
impl InteractionState for ParallelStore {
    async fn apply_move(&self, cmd: MoveCommand) -> Result<MoveResult, StateError> {
        self.locked("move").apply_move(&cmd)
    }

    async fn apply_buff(&self, cmd: BuffCommand) -> Result<BuffResult, StateError> {
        self.locked("buff").apply_buff(&cmd)
    }

    async fn apply_attack(&self, cmd: AttackCommand) -> Result<AttackResult, StateError> {
        self.locked("attack").apply_attack(&cmd)
    }

    async fn apply_trade(&self, cmd: TradeCommand) -> Result<TradeResult, StateError> {
        self.locked("trade").apply_trade(&cmd)
    }

    async fn register_player(&self, player_id: &str, room_id: &str) -> Result<(), StateError> {
        self.locked("register").register_player(player_id, room_id)
    }
}
