use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::transport::{CLOSE_NORMAL, Transport};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-lifetime monotonic connection counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The physical I/O pairing for one session at one time. Pure pass-through;
/// no buffering beyond what the transport provides.
pub struct Connection {
    id: ConnectionId,
    transport: Box<dyn Transport>,
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            id: ConnectionId::next(),
            transport,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn read(&self) -> std::io::Result<Bytes> {
        self.transport.read().await
    }

    pub async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        self.transport.write(data).await
    }

    pub async fn close(&self) {
        let _ = self.transport.close(CLOSE_NORMAL, "").await;
    }
}
