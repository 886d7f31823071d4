use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One (pool size, wait time) condition under which a queue may matchmake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub min_players: usize,
    pub min_wait_ms: u64,
}

impl Requirement {
    pub const fn new(min_players: usize, min_wait_ms: u64) -> Self {
        Self {
            min_players,
            min_wait_ms,
        }
    }

    pub fn is_met(&self, pool_size: usize, oldest_wait: Duration) -> bool {
        pool_size >= self.min_players && oldest_wait >= Duration::from_millis(self.min_wait_ms)
    }
}

/// Whether a queue should matchmake now: any single requirement satisfied by
/// the pool size and the wait of its oldest entry. Expired queues never open.
pub fn gate_open(
    requirements: &[Requirement],
    pool_size: usize,
    oldest_wait: Duration,
    expired: bool,
) -> bool {
    if expired {
        return false;
    }
    requirements.iter().any(|r| r.is_met(pool_size, oldest_wait))
}
