use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gridproto::session::SessionId;

/// Bitmask of liveness axes that have expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleReason(u8);

impl IdleReason {
    pub const NONE: IdleReason = IdleReason(0);
    pub const READ: IdleReason = IdleReason(1 << 0);
    pub const WRITE: IdleReason = IdleReason(1 << 1);
    pub const PONG: IdleReason = IdleReason(1 << 2);
    /// Idle checking is off (timeout of zero).
    pub const DISABLED: IdleReason = IdleReason(1 << 3);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn contains(self, other: IdleReason) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for IdleReason {
    type Output = IdleReason;

    fn bitor(self, rhs: IdleReason) -> IdleReason {
        IdleReason(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for IdleReason {
    fn bitor_assign(&mut self, rhs: IdleReason) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Display for IdleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            return f.write_str("none");
        }
        if self.contains(Self::DISABLED) {
            return f.write_str("disabled");
        }
        let mut first = true;
        for (flag, name) in [
            (Self::READ, "read"),
            (Self::WRITE, "write"),
            (Self::PONG, "pong"),
        ] {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Logical per-connection state that survives momentary I/O events.
///
/// The three activity timestamps are updated with `fetch_max`, so they are
/// non-decreasing even when touches race. `closed` flips false -> true at most
/// once.
pub struct Session {
    id: SessionId,
    last_read: AtomicU64,
    last_write: AtomicU64,
    last_pong: AtomicU64,
    closed: AtomicBool,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(SessionId::generate())
    }

    pub fn with_id(id: SessionId) -> Self {
        let now = now_nanos();
        Self {
            id,
            last_read: AtomicU64::new(now),
            last_write: AtomicU64::new(now),
            last_pong: AtomicU64::new(now),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn touch_read(&self) {
        self.last_read.fetch_max(now_nanos(), Ordering::AcqRel);
    }

    pub fn touch_write(&self) {
        self.last_write.fetch_max(now_nanos(), Ordering::AcqRel);
    }

    pub fn touch_pong(&self) {
        self.last_pong.fetch_max(now_nanos(), Ordering::AcqRel);
    }

    /// Returns true on the first call only.
    pub fn close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_idle(&self, timeout: Duration) -> (bool, IdleReason) {
        if timeout.is_zero() {
            return (false, IdleReason::DISABLED);
        }
        let mut reason = IdleReason::NONE;
        if self.is_read_idle(timeout) {
            reason |= IdleReason::READ;
        }
        if self.is_write_idle(timeout) {
            reason |= IdleReason::WRITE;
        }
        if self.is_pong_idle(timeout) {
            reason |= IdleReason::PONG;
        }
        (!reason.is_none(), reason)
    }

    pub fn is_read_idle(&self, timeout: Duration) -> bool {
        idle_since(self.last_read.load(Ordering::Acquire), timeout)
    }

    pub fn is_write_idle(&self, timeout: Duration) -> bool {
        idle_since(self.last_write.load(Ordering::Acquire), timeout)
    }

    pub fn is_pong_idle(&self, timeout: Duration) -> bool {
        idle_since(self.last_pong.load(Ordering::Acquire), timeout)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn idle_since(last: u64, timeout: Duration) -> bool {
    now_nanos().saturating_sub(last) > timeout.as_nanos() as u64
}
