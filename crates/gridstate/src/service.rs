use std::sync::Arc;
use std::time::Instant;

use crate::command::{
    AttackCommand, AttackResult, BuffCommand, BuffResult, MoveCommand, MoveResult, TradeCommand,
    TradeResult,
};
use crate::metrics::MetricsRecorder;
use crate::store::{InteractionState, StateError};

#[derive(Debug)]
pub enum ServiceError {
    InvalidPayload(String),
    State(StateError),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::InvalidPayload(msg) => write!(f, "invalid payload: {msg}"),
            ServiceError::State(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<StateError> for ServiceError {
    fn from(err: StateError) -> Self {
        ServiceError::State(err)
    }
}

fn validate_move(cmd: &MoveCommand) -> Result<(), String> {
    if cmd.actor_id.is_empty() {
        return Err("actor id is required".into());
    }
    if cmd.room_id.is_empty() {
        return Err("room id is required".into());
    }
    if !cmd.next_position.is_finite() {
        return Err(format!("invalid position: {:?}", cmd.next_position));
    }
    Ok(())
}

fn validate_buff(cmd: &BuffCommand) -> Result<(), String> {
    if cmd.caster_id.is_empty() {
        return Err("caster id is required".into());
    }
    if cmd.room_id.is_empty() {
        return Err("room id is required".into());
    }
    if cmd.effect.effect_id.is_empty() {
        return Err("effect id is required".into());
    }
    if cmd.effect.duration_ms == 0 {
        return Err("duration must be positive".into());
    }
    Ok(())
}

fn validate_attack(cmd: &AttackCommand) -> Result<(), String> {
    if cmd.attacker_id.is_empty() || cmd.target_id.is_empty() {
        return Err("attacker and target ids are required".into());
    }
    if cmd.room_id.is_empty() {
        return Err("room id is required".into());
    }
    if cmd.damage <= 0 {
        return Err("damage must be positive".into());
    }
    Ok(())
}

fn validate_trade(cmd: &TradeCommand) -> Result<(), String> {
    if cmd.initiator_id.is_empty() || cmd.partner_id.is_empty() {
        return Err("initiator and partner ids are required".into());
    }
    if cmd.room_id.is_empty() {
        return Err("room id is required".into());
    }
    if cmd.offer.is_empty() && cmd.request.is_empty() {
        return Err("either offer or request must be present".into());
    }
    Ok(())
}

/// Validates command payloads, delegates to whichever store shape is wired
/// in, and records per-endpoint statistics.
pub struct InteractionService {
    state: Arc<dyn InteractionState>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl InteractionService {
    pub fn new(state: Arc<dyn InteractionState>, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self { state, metrics }
    }

    pub async fn apply_move(&self, cmd: MoveCommand) -> Result<MoveResult, ServiceError> {
        let started = Instant::now();
        validate_move(&cmd).map_err(ServiceError::InvalidPayload)?;
        let result = self.state.apply_move(cmd).await?;
        self.record("move", started);
        Ok(result)
    }

    pub async fn apply_buff(&self, cmd: BuffCommand) -> Result<BuffResult, ServiceError> {
        let started = Instant::now();
        validate_buff(&cmd).map_err(ServiceError::InvalidPayload)?;
        let result = self.state.apply_buff(cmd).await?;
        self.record("buff", started);
        Ok(result)
    }

    pub async fn apply_attack(&self, cmd: AttackCommand) -> Result<AttackResult, ServiceError> {
        let started = Instant::now();
        validate_attack(&cmd).map_err(ServiceError::InvalidPayload)?;
        let result = self.state.apply_attack(cmd).await?;
        self.record("attack", started);
        Ok(result)
    }

    pub async fn apply_trade(&self, cmd: TradeCommand) -> Result<TradeResult, ServiceError> {
        let started = Instant::now();
        validate_trade(&cmd).map_err(ServiceError::InvalidPayload)?;
        let result = self.state.apply_trade(cmd).await?;
        self.record("trade", started);
        Ok(result)
    }

    fn record(&self, endpoint: &str, started: Instant) {
        self.metrics.record_latency(endpoint, started.elapsed());
        self.metrics
            .increment_counter(&format!("requests.{endpoint}"), 1);
    }
}

fn random_id() -> String {
    let mut b = [0u8; 16];
    getrandom::getrandom(&mut b).expect("getrandom");
    let mut out = String::with_capacity(32);
    for x in b {
        out.push_str(&format!("{x:02x}"));
    }
    out
}

/// Hands a fresh player a registered identity and its room.
pub struct ConnectService {
    state: Arc<dyn InteractionState>,
    default_room: String,
}

impl ConnectService {
    pub fn new(state: Arc<dyn InteractionState>, default_room: String) -> Self {
        Self {
            state,
            default_room,
        }
    }

    pub async fn connect(&self) -> Result<(String, String), ServiceError> {
        let player_id = random_id();
        let room_id = self.default_room.clone();
        self.state.register_player(&player_id, &room_id).await?;
        tracing::info!(player = %player_id, room = %room_id, "player connected");
        Ok((player_id, room_id))
    }
}
