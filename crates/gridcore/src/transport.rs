use async_trait::async_trait;
use bytes::Bytes;

/// Normal-closure close code.
pub const CLOSE_NORMAL: u16 = 1000;

/// Framed byte I/O boundary the core runs on top of.
///
/// Implementations must support a concurrent reader and writer: the endpoint
/// read loop and write loop run at the same time against the same transport.
/// Errors are opaque to the core; a dead transport is expected to keep
/// returning errors from `read` until the endpoint closes it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn read(&self) -> std::io::Result<Bytes>;
    async fn write(&self, data: &[u8]) -> std::io::Result<()>;
    async fn close(&self, code: u16, reason: &str) -> std::io::Result<()>;
}
