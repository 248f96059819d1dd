use std::collections::HashMap;

use async_trait::async_trait;

use crate::command::{
    AttackCommand, AttackResult, BuffCommand, BuffResult, MoveCommand, MoveResult, TradeCommand,
    TradeResult, TradeState, Vec2,
};

pub const STARTING_HEALTH: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum StateError {
    UnknownPlayer(String),
    UnknownTarget(String),
    /// The single-loop worker is gone; no further commands can be applied.
    Closed,
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::UnknownPlayer(id) => write!(f, "unknown player: {id}"),
            StateError::UnknownTarget(id) => write!(f, "unknown target: {id}"),
            StateError::Closed => write!(f, "state store is closed"),
        }
    }
}

impl std::error::Error for StateError {}

/// Contract both store shapes implement. Commands are applied in the order
/// the store observes them; the concurrency discipline is the implementer's
/// business.
#[async_trait]
pub trait InteractionState: Send + Sync {
    async fn apply_move(&self, cmd: MoveCommand) -> Result<MoveResult, StateError>;
    async fn apply_buff(&self, cmd: BuffCommand) -> Result<BuffResult, StateError>;
    async fn apply_attack(&self, cmd: AttackCommand) -> Result<AttackResult, StateError>;
    async fn apply_trade(&self, cmd: TradeCommand) -> Result<TradeResult, StateError>;
    async fn register_player(&self, player_id: &str, room_id: &str) -> Result<(), StateError>;
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveBuff {
    effect_id: String,
    magnitude: f64,
    remaining_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct PlayerState {
    room_id: String,
    position: Vec2,
    facing: f64,
    health: i64,
    buffs: Vec<ActiveBuff>,
    inventory: HashMap<String, i64>,
}

impl PlayerState {
    fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            position: Vec2::default(),
            facing: 0.0,
            health: STARTING_HEALTH,
            buffs: Vec::new(),
            inventory: HashMap::new(),
        }
    }
}

/// The single-threaded rulebook. Not thread safe on purpose: callers pick a
/// discipline (lock or channel) around it.
#[derive(Debug, Default)]
pub struct WorldState {
    players: HashMap<String, PlayerState>,
    seq: u64,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Registration is an upsert on the room assignment; an existing player
    /// keeps their state.
    pub fn register_player(&mut self, player_id: &str, room_id: &str) -> Result<(), StateError> {
        match self.players.get_mut(player_id) {
            Some(player) => player.room_id = room_id.to_string(),
            None => {
                self.players
                    .insert(player_id.to_string(), PlayerState::new(room_id));
            }
        }
        Ok(())
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn apply_move(&mut self, cmd: &MoveCommand) -> Result<MoveResult, StateError> {
        let seq = self.next_seq();
        let player = self
            .players
            .get_mut(&cmd.actor_id)
            .ok_or_else(|| StateError::UnknownPlayer(cmd.actor_id.clone()))?;
        player.room_id = cmd.room_id.clone();
        player.position = cmd.next_position;
        player.facing = cmd.facing;
        Ok(MoveResult {
            seq,
            actor_id: cmd.actor_id.clone(),
            room_id: cmd.room_id.clone(),
            position: player.position,
            facing: player.facing,
        })
    }

    /// Applies the effect to every known target; unknown targets are reported
    /// back rather than failing the whole command.
    pub fn apply_buff(&mut self, cmd: &BuffCommand) -> Result<BuffResult, StateError> {
        let seq = self.next_seq();
        if !self.players.contains_key(&cmd.caster_id) {
            return Err(StateError::UnknownPlayer(cmd.caster_id.clone()));
        }
        let mut applied_to = Vec::new();
        let mut skipped = Vec::new();
        for target_id in &cmd.target_ids {
            match self.players.get_mut(target_id) {
                Some(target) => {
                    target.buffs.push(ActiveBuff {
                        effect_id: cmd.effect.effect_id.clone(),
                        magnitude: cmd.effect.magnitude,
                        remaining_ms: cmd.effect.duration_ms,
                    });
                    applied_to.push(target_id.clone());
                }
                None => skipped.push(target_id.clone()),
            }
        }
        Ok(BuffResult {
            seq,
            caster_id: cmd.caster_id.clone(),
            effect_id: cmd.effect.effect_id.clone(),
            applied_to,
            skipped,
        })
    }

    pub fn apply_attack(&mut self, cmd: &AttackCommand) -> Result<AttackResult, StateError> {
        let seq = self.next_seq();
        if !self.players.contains_key(&cmd.attacker_id) {
            return Err(StateError::UnknownPlayer(cmd.attacker_id.clone()));
        }
        let target = self
            .players
            .get_mut(&cmd.target_id)
            .ok_or_else(|| StateError::UnknownTarget(cmd.target_id.clone()))?;
        let damage_dealt = cmd.damage.min(target.health);
        target.health -= damage_dealt;
        Ok(AttackResult {
            seq,
            attacker_id: cmd.attacker_id.clone(),
            target_id: cmd.target_id.clone(),
            damage_dealt,
            remaining_health: target.health,
            defeated: target.health == 0,
        })
    }

    /// A confirmed trade moves the offered items to the partner and the
    /// requested items to the initiator. With `requires_confirmation` set,
    /// nothing is applied yet.
    pub fn apply_trade(&mut self, cmd: &TradeCommand) -> Result<TradeResult, StateError> {
        let seq = self.next_seq();
        if !self.players.contains_key(&cmd.initiator_id) {
            return Err(StateError::UnknownPlayer(cmd.initiator_id.clone()));
        }
        if !self.players.contains_key(&cmd.partner_id) {
            return Err(StateError::UnknownTarget(cmd.partner_id.clone()));
        }

        if cmd.requires_confirmation {
            return Ok(TradeResult {
                seq,
                initiator_id: cmd.initiator_id.clone(),
                partner_id: cmd.partner_id.clone(),
                state: TradeState::PendingConfirmation,
            });
        }

        for change in &cmd.offer {
            self.adjust_inventory(&cmd.initiator_id, &change.item_id, -change.quantity_delta);
            self.adjust_inventory(&cmd.partner_id, &change.item_id, change.quantity_delta);
        }
        for change in &cmd.request {
            self.adjust_inventory(&cmd.partner_id, &change.item_id, -change.quantity_delta);
            self.adjust_inventory(&cmd.initiator_id, &change.item_id, change.quantity_delta);
        }

        Ok(TradeResult {
            seq,
            initiator_id: cmd.initiator_id.clone(),
            partner_id: cmd.partner_id.clone(),
            state: TradeState::Completed,
        })
    }

    pub fn inventory_of(&self, player_id: &str, item_id: &str) -> i64 {
        self.players
            .get(player_id)
            .and_then(|p| p.inventory.get(item_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn health_of(&self, player_id: &str) -> Option<i64> {
        self.players.get(player_id).map(|p| p.health)
    }

    fn adjust_inventory(&mut self, player_id: &str, item_id: &str, delta: i64) {
        if let Some(player) = self.players.get_mut(player_id) {
            *player.inventory.entry(item_id.to_string()).or_insert(0) += delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{BuffEffect, ItemChange};

    fn world_with(players: &[&str]) -> WorldState {
        let mut w = WorldState::new();
        for p in players {
            w.register_player(p, "room-1").unwrap();
        }
        w
    }

    #[test]
    fn move_updates_position_and_room() {
        let mut w = world_with(&["alice"]);
        let result = w
            .apply_move(&MoveCommand {
                actor_id: "alice".into(),
                room_id: "room-2".into(),
                next_position: Vec2::new(3.0, 4.0),
                facing: 1.5,
            })
            .unwrap();
        assert_eq!(result.position, Vec2::new(3.0, 4.0));
        assert_eq!(result.room_id, "room-2");
        assert_eq!(result.seq, 1);
    }

    #[test]
    fn move_for_unknown_actor_fails() {
        let mut w = WorldState::new();
        let err = w
            .apply_move(&MoveCommand {
                actor_id: "ghost".into(),
                room_id: "room-1".into(),
                next_position: Vec2::default(),
                facing: 0.0,
            })
            .unwrap_err();
        assert_eq!(err, StateError::UnknownPlayer("ghost".into()));
    }

    #[test]
    fn buff_skips_unknown_targets() {
        let mut w = world_with(&["caster", "tank"]);
        let result = w
            .apply_buff(&BuffCommand {
                caster_id: "caster".into(),
                room_id: "room-1".into(),
                target_ids: vec!["tank".into(), "ghost".into()],
                effect: BuffEffect {
                    effect_id: "haste".into(),
                    magnitude: 1.2,
                    duration_ms: 5000,
                    tags: vec![],
                },
            })
            .unwrap();
        assert_eq!(result.applied_to, vec!["tank".to_string()]);
        assert_eq!(result.skipped, vec!["ghost".to_string()]);
    }

    #[test]
    fn attack_saturates_at_zero_health() {
        let mut w = world_with(&["a", "b"]);
        let first = w
            .apply_attack(&AttackCommand {
                attacker_id: "a".into(),
                target_id: "b".into(),
                room_id: "room-1".into(),
                skill_id: "slash".into(),
                damage: 70,
                additional_effects: vec![],
            })
            .unwrap();
        assert_eq!(first.remaining_health, 30);
        assert!(!first.defeated);

        let second = w
            .apply_attack(&AttackCommand {
                attacker_id: "a".into(),
                target_id: "b".into(),
                room_id: "room-1".into(),
                skill_id: "slash".into(),
                damage: 70,
                additional_effects: vec![],
            })
            .unwrap();
        assert_eq!(second.damage_dealt, 30);
        assert_eq!(second.remaining_health, 0);
        assert!(second.defeated);
    }

    #[test]
    fn completed_trade_moves_items_both_ways() {
        let mut w = world_with(&["seller", "buyer"]);
        let result = w
            .apply_trade(&TradeCommand {
                initiator_id: "seller".into(),
                partner_id: "buyer".into(),
                room_id: "room-1".into(),
                offer: vec![ItemChange {
                    item_id: "sword".into(),
                    quantity_delta: 1,
                    metadata: HashMap::new(),
                }],
                request: vec![ItemChange {
                    item_id: "gold".into(),
                    quantity_delta: 50,
                    metadata: HashMap::new(),
                }],
                requires_confirmation: false,
            })
            .unwrap();
        assert_eq!(result.state, TradeState::Completed);
        assert_eq!(w.inventory_of("buyer", "sword"), 1);
        assert_eq!(w.inventory_of("seller", "sword"), -1);
        assert_eq!(w.inventory_of("seller", "gold"), 50);
        assert_eq!(w.inventory_of("buyer", "gold"), -50);
    }

    #[test]
    fn unconfirmed_trade_applies_nothing() {
        let mut w = world_with(&["a", "b"]);
        let result = w
            .apply_trade(&TradeCommand {
                initiator_id: "a".into(),
                partner_id: "b".into(),
                room_id: "room-1".into(),
                offer: vec![ItemChange {
                    item_id: "gem".into(),
                    quantity_delta: 3,
                    metadata: HashMap::new(),
                }],
                request: vec![],
                requires_confirmation: true,
            })
            .unwrap();
        assert_eq!(result.state, TradeState::PendingConfirmation);
        assert_eq!(w.inventory_of("b", "gem"), 0);
    }

    #[test]
    fn register_is_an_upsert() {
        let mut w = world_with(&["a"]);
        w.apply_attack(&AttackCommand {
            attacker_id: "a".into(),
            target_id: "a".into(),
            room_id: "room-1".into(),
            skill_id: String::new(),
            damage: 10,
            additional_effects: vec![],
        })
        .unwrap();

        w.register_player("a", "room-9").unwrap();
        assert_eq!(w.player_count(), 1);
        // Re-registration keeps accumulated state.
        assert_eq!(w.health_of("a"), Some(90));
    }
}
