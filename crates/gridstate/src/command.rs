use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Buff identity, strength and duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffEffect {
    pub effect_id: String,
    pub magnitude: f64,
    pub duration_ms: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One inventory delta inside a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemChange {
    pub item_id: String,
    pub quantity_delta: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveCommand {
    pub actor_id: String,
    pub room_id: String,
    pub next_position: Vec2,
    #[serde(default)]
    pub facing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffCommand {
    pub caster_id: String,
    pub room_id: String,
    pub target_ids: Vec<String>,
    pub effect: BuffEffect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackCommand {
    pub attacker_id: String,
    pub target_id: String,
    pub room_id: String,
    #[serde(default)]
    pub skill_id: String,
    pub damage: i64,
    #[serde(default)]
    pub additional_effects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeCommand {
    pub initiator_id: String,
    pub partner_id: String,
    pub room_id: String,
    #[serde(default)]
    pub offer: Vec<ItemChange>,
    #[serde(default)]
    pub request: Vec<ItemChange>,
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// Results carry a per-store logical sequence number instead of wall-clock
/// time, so two stores fed the same ordered input produce identical values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveResult {
    pub seq: u64,
    pub actor_id: String,
    pub room_id: String,
    pub position: Vec2,
    pub facing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffResult {
    pub seq: u64,
    pub caster_id: String,
    pub effect_id: String,
    pub applied_to: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackResult {
    pub seq: u64,
    pub attacker_id: String,
    pub target_id: String,
    pub damage_dealt: i64,
    pub remaining_health: i64,
    pub defeated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    Completed,
    PendingConfirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub seq: u64,
    pub initiator_id: String,
    pub partner_id: String,
    pub state: TradeState,
}
