use async_trait::async_trait;
use bytes::Bytes;
use gridcore::room::Application;
use gridproto::frame::{
    CONTROL_JOIN, CONTROL_LEAVE, DATA_TYPE_CONTROL, DATA_TYPE_INPUT, HEADER_SIZE, KEY_DOWN,
    KEY_LEFT, KEY_RIGHT, KEY_UP, PAYLOAD_HEADER_SIZE, encode_actor_frame, parse_input,
    parse_payload_header,
};
use gridproto::session::SessionId;
use tracing::debug;

use crate::field::Field;

/// World units an actor moves per input frame.
pub const DEFAULT_MOVE_SPEED: f32 = 0.2;

/// Per-tick field logic hosted by a room.
///
/// Join spawns the session's actor at the world center, Leave despawns it,
/// Input moves it by the pressed direction; every tick with at least one
/// actor emits a full actor snapshot for the room to broadcast.
pub struct FieldApp {
    field: Field,
    move_speed: f32,
    seq: u32,
}

impl FieldApp {
    pub fn new(field: Field) -> Self {
        Self {
            field,
            move_speed: DEFAULT_MOVE_SPEED,
            seq: 0,
        }
    }

    pub fn with_move_speed(mut self, speed: f32) -> Self {
        self.move_speed = speed;
        self
    }

    pub fn field(&self) -> &Field {
        &self.field
    }
}

fn direction(key_mask: u8) -> (f32, f32) {
    let mut dx = 0.0;
    let mut dy = 0.0;
    if key_mask & KEY_UP != 0 {
        dy -= 1.0;
    }
    if key_mask & KEY_DOWN != 0 {
        dy += 1.0;
    }
    if key_mask & KEY_LEFT != 0 {
        dx -= 1.0;
    }
    if key_mask & KEY_RIGHT != 0 {
        dx += 1.0;
    }
    (dx, dy)
}

#[async_trait]
impl Application for FieldApp {
    async fn handle_message(&mut self, session_id: SessionId, data: &[u8]) -> anyhow::Result<()> {
        if data.len() < HEADER_SIZE + PAYLOAD_HEADER_SIZE {
            anyhow::bail!("frame too short: {} bytes", data.len());
        }
        let payload = parse_payload_header(&data[HEADER_SIZE..])?;
        match payload.data_type {
            DATA_TYPE_CONTROL => {
                match payload.sub_type {
                    CONTROL_JOIN => {
                        self.field.spawn_at_center(session_id);
                    }
                    CONTROL_LEAVE => {
                        self.field.remove(session_id);
                    }
                    other => {
                        debug!(sub_type = other, "ignoring control sub type");
                    }
                }
                Ok(())
            }
            DATA_TYPE_INPUT => {
                let key_mask = parse_input(&data[HEADER_SIZE + PAYLOAD_HEADER_SIZE..])?;
                let (dx, dy) = direction(key_mask);
                self.field
                    .actor_move(session_id, dx * self.move_speed, dy * self.move_speed);
                Ok(())
            }
            other => {
                debug!(data_type = other, "ignoring data type");
                Ok(())
            }
        }
    }

    fn tick(&mut self) -> Option<Bytes> {
        if self.field.is_empty() {
            return None;
        }
        self.seq = self.seq.wrapping_add(1);
        let actors: Vec<(SessionId, gridproto::position::Position2D)> = self
            .field
            .actors()
            .into_iter()
            .map(|a| (a.session_id, a.position))
            .collect();
        Some(encode_actor_frame(SessionId::NIL, self.seq, &actors))
    }
}
