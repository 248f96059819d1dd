use std::collections::HashMap;

use gridproto::position::Position2D;
use gridproto::session::SessionId;
use tracing::warn;

use crate::map::Map;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actor {
    pub session_id: SessionId,
    pub position: Position2D,
}

/// The map plus every actor standing on it. Positions are clamped to the
/// world bounds; the field never rejects a move, it just stops at the edge.
pub struct Field {
    map: Map,
    actors: HashMap<SessionId, Actor>,
}

impl Field {
    pub fn new(map: Map) -> Self {
        Self {
            map,
            actors: HashMap::new(),
        }
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn spawn_at_center(&mut self, session_id: SessionId) -> Actor {
        let actor = Actor {
            session_id,
            position: Position2D::new(self.map.world_width() / 2.0, self.map.world_height() / 2.0),
        };
        self.actors.insert(session_id, actor);
        actor
    }

    pub fn actor_move(&mut self, session_id: SessionId, dx: f32, dy: f32) {
        let Some(actor) = self.actors.get_mut(&session_id) else {
            warn!(session = %session_id, "move for unknown actor ignored");
            return;
        };
        actor.position.x = (actor.position.x + dx).clamp(0.0, self.map.world_width());
        actor.position.y = (actor.position.y + dy).clamp(0.0, self.map.world_height());
    }

    pub fn remove(&mut self, session_id: SessionId) {
        self.actors.remove(&session_id);
    }

    pub fn get_actor(&self, session_id: SessionId) -> Option<&Actor> {
        self.actors.get(&session_id)
    }

    /// Snapshot of all actors, ordered by session id so encodings are stable.
    pub fn actors(&self) -> Vec<Actor> {
        let mut actors: Vec<Actor> = self.actors.values().copied().collect();
        actors.sort_by_key(|a| a.session_id);
        actors
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
