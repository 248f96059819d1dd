//! `gridstate`: the interaction command store in both concurrency shapes.
//!
//! One rulebook (`WorldState`) applies move/buff/attack/trade commands.
//! `ParallelStore` shares it behind a reader/writer lock; `SingleLoopStore`
//! serialises every request onto one consumer task. Both implement the same
//! `InteractionState` contract and, for the same ordered input sequence,
//! produce identical results — which is the whole point of the comparison.

pub mod command;
pub mod metrics;
pub mod parallel;
pub mod service;
pub mod single;
pub mod store;

pub use command::{
    AttackCommand, AttackResult, BuffCommand, BuffEffect, BuffResult, ItemChange, MoveCommand,
    MoveResult, TradeCommand, TradeResult, TradeState, Vec2,
};
pub use metrics::{MetricsRecorder, TracingMetrics};
pub use parallel::ParallelStore;
pub use service::{ConnectService, InteractionService, ServiceError};
pub use single::SingleLoopStore;
pub use store::{InteractionState, StateError, WorldState};
