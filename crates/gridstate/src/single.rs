use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::command::{
    AttackCommand, AttackResult, BuffCommand, BuffResult, MoveCommand, MoveResult, TradeCommand,
    TradeResult,
};
use crate::store::{InteractionState, StateError, WorldState};

use async_trait::async_trait;

const REQUEST_QUEUE_CAPACITY: usize = 1024;

enum StateRequest {
    Move(MoveCommand, oneshot::Sender<Result<MoveResult, StateError>>),
    Buff(BuffCommand, oneshot::Sender<Result<BuffResult, StateError>>),
    Attack(AttackCommand, oneshot::Sender<Result<AttackResult, StateError>>),
    Trade(TradeCommand, oneshot::Sender<Result<TradeResult, StateError>>),
    Register(String, String, oneshot::Sender<Result<(), StateError>>),
}

/// Channel-serialised store: every request is shipped to one consumer task
/// that owns the rulebook outright, so no locks exist anywhere. Request order
/// on the channel is the logical order commands are applied in.
pub struct SingleLoopStore {
    tx: mpsc::Sender<StateRequest>,
}

impl SingleLoopStore {
    /// Spawns the consumer task; it runs until every handle is dropped.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<StateRequest>(REQUEST_QUEUE_CAPACITY);
        tokio::spawn(async move {
            let mut state = WorldState::new();
            while let Some(req) = rx.recv().await {
                match req {
                    StateRequest::Move(cmd, reply) => {
                        let _ = reply.send(state.apply_move(&cmd));
                    }
                    StateRequest::Buff(cmd, reply) => {
                        let _ = reply.send(state.apply_buff(&cmd));
                    }
                    StateRequest::Attack(cmd, reply) => {
                        let _ = reply.send(state.apply_attack(&cmd));
                    }
                    StateRequest::Trade(cmd, reply) => {
                        let _ = reply.send(state.apply_trade(&cmd));
                    }
                    StateRequest::Register(player_id, room_id, reply) => {
                        let _ = reply.send(state.register_player(&player_id, &room_id));
                    }
                }
            }
            info!("single-loop state worker stopped");
        });
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, StateError>>) -> StateRequest,
    ) -> Result<T, StateError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StateError::Closed)?;
        reply_rx.await.map_err(|_| StateError::Closed)?
    }
}

#[async_trait]
impl InteractionState for SingleLoopStore {
    async fn apply_move(&self, cmd: MoveCommand) -> Result<MoveResult, StateError> {
        self.request(|reply| StateRequest::Move(cmd, reply)).await
    }

    async fn apply_buff(&self, cmd: BuffCommand) -> Result<BuffResult, StateError> {
        self.request(|reply| StateRequest::Buff(cmd, reply)).await
    }

    async fn apply_attack(&self, cmd: AttackCommand) -> Result<AttackResult, StateError> {
        self.request(|reply| StateRequest::Attack(cmd, reply)).await
    }

    async fn apply_trade(&self, cmd: TradeCommand) -> Result<TradeResult, StateError> {
        self.request(|reply| StateRequest::Trade(cmd, reply)).await
    }

    async fn register_player(&self, player_id: &str, room_id: &str) -> Result<(), StateError> {
        self.request(|reply| {
            StateRequest::Register(player_id.to_string(), room_id.to_string(), reply)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{BuffEffect, ItemChange, TradeState, Vec2};
    use crate::metrics::TracingMetrics;
    use crate::parallel::ParallelStore;
    use std::collections::HashMap;
    use std::sync::Arc;

    enum Cmd {
        Move(MoveCommand),
        Buff(BuffCommand),
        Attack(AttackCommand),
        Trade(TradeCommand),
    }

    fn script() -> Vec<Cmd> {
        vec![
            Cmd::Move(MoveCommand {
                actor_id: "a".into(),
                room_id: "r".into(),
                next_position: Vec2::new(1.0, 2.0),
                facing: 0.5,
            }),
            Cmd::Buff(BuffCommand {
                caster_id: "a".into(),
                room_id: "r".into(),
                target_ids: vec!["b".into(), "nobody".into()],
                effect: BuffEffect {
                    effect_id: "shield".into(),
                    magnitude: 2.0,
                    duration_ms: 1000,
                    tags: vec![],
                },
            }),
            Cmd::Attack(AttackCommand {
                attacker_id: "a".into(),
                target_id: "b".into(),
                room_id: "r".into(),
                skill_id: "jab".into(),
                damage: 25,
                additional_effects: vec![],
            }),
            Cmd::Trade(TradeCommand {
                initiator_id: "a".into(),
                partner_id: "b".into(),
                room_id: "r".into(),
                offer: vec![ItemChange {
                    item_id: "ore".into(),
                    quantity_delta: 2,
                    metadata: HashMap::new(),
                }],
                request: vec![],
                requires_confirmation: false,
            }),
            Cmd::Attack(AttackCommand {
                attacker_id: "b".into(),
                target_id: "a".into(),
                room_id: "r".into(),
                skill_id: "jab".into(),
                damage: 200,
                additional_effects: vec![],
            }),
        ]
    }

    async fn run_script(store: &dyn InteractionState) -> Vec<String> {
        store.register_player("a", "r").await.unwrap();
        store.register_player("b", "r").await.unwrap();
        let mut log = Vec::new();
        for cmd in script() {
            let entry = match cmd {
                Cmd::Move(c) => format!("{:?}", store.apply_move(c).await),
                Cmd::Buff(c) => format!("{:?}", store.apply_buff(c).await),
                Cmd::Attack(c) => format!("{:?}", store.apply_attack(c).await),
                Cmd::Trade(c) => format!("{:?}", store.apply_trade(c).await),
            };
            log.push(entry);
        }
        log
    }

    /// Same ordered input sequence, identical result sequence from both
    /// concurrency shapes.
    #[tokio::test]
    async fn stores_agree_on_a_command_script() {
        let parallel = ParallelStore::new(Arc::new(TracingMetrics));
        let single = SingleLoopStore::spawn();

        let parallel_log = run_script(&parallel).await;
        let single_log = run_script(&single).await;
        assert_eq!(parallel_log, single_log);
    }

    #[tokio::test]
    async fn worker_serialises_requests() {
        let store = SingleLoopStore::spawn();
        store.register_player("a", "r").await.unwrap();

        let first = store
            .apply_move(MoveCommand {
                actor_id: "a".into(),
                room_id: "r".into(),
                next_position: Vec2::new(1.0, 1.0),
                facing: 0.0,
            })
            .await
            .unwrap();
        let second = store
            .apply_move(MoveCommand {
                actor_id: "a".into(),
                room_id: "r".into(),
                next_position: Vec2::new(2.0, 2.0),
                facing: 0.0,
            })
            .await
            .unwrap();
        assert!(second.seq > first.seq);
        assert_eq!(second.position, Vec2::new(2.0, 2.0));
    }

    #[tokio::test]
    async fn trade_round_trips_through_the_worker() {
        let store = SingleLoopStore::spawn();
        store.register_player("x", "r").await.unwrap();
        store.register_player("y", "r").await.unwrap();

        let res = store
            .apply_trade(TradeCommand {
                initiator_id: "x".into(),
                partner_id: "y".into(),
                room_id: "r".into(),
                offer: vec![],
                request: vec![],
                requires_confirmation: true,
            })
            .await
            .unwrap();
        assert_eq!(res.state, TradeState::PendingConfirmation);
    }
}
