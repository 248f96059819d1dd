//! `gridfield`: the tile-map application hosted by a room.
//!
//! The field owns a tile map and the actors standing on it. `FieldApp` wires
//! it into the interaction core: control frames spawn and remove actors,
//! input frames move them, and every tick emits an actor snapshot for the
//! room to broadcast.

pub mod app;
pub mod field;
pub mod map;

pub use app::FieldApp;
pub use field::{Actor, Field};
pub use map::{Map, TileId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    TileOutOfRange {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldError::TileOutOfRange {
                x,
                y,
                width,
                height,
            } => write!(
                f,
                "tile coordinates ({x}, {y}) out of range [0-{}, 0-{}]",
                width - 1,
                height - 1
            ),
        }
    }
}

impl std::error::Error for FieldError {}
