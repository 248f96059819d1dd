use async_trait::async_trait;
use gridproto::room::RoomId;
use gridproto::session::SessionId;

use crate::CoreError;

/// Assigns sessions to rooms. The seam exists so matchmaking can replace the
/// fixed assignment later.
#[async_trait]
pub trait RoomManager: Send + Sync {
    async fn get_room(&self, session_id: SessionId) -> Result<RoomId, CoreError>;
}

/// Returns one configured room regardless of the session.
pub struct FixedRoomManager {
    room_id: RoomId,
}

impl FixedRoomManager {
    pub fn new(room_id: RoomId) -> Self {
        Self { room_id }
    }
}

#[async_trait]
impl RoomManager for FixedRoomManager {
    async fn get_room(&self, _session_id: SessionId) -> Result<RoomId, CoreError> {
        Ok(self.room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_manager_ignores_session() {
        let rid = RoomId::generate();
        let mgr = FixedRoomManager::new(rid);
        assert_eq!(mgr.get_room(SessionId::generate()).await.unwrap(), rid);
        assert_eq!(mgr.get_room(SessionId::generate()).await.unwrap(), rid);
    }
}
