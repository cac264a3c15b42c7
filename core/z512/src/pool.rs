//! Process-wide reuse pools for byte buffers and digest states.
//!
//! Both pools are bounded: a release beyond the residency cap drops the
//! value instead of growing the pool. Buffers are zeroized before they are
//! reinserted, and digest states are reset, so an acquired value never
//! carries a previous caller's bytes.

use std::collections::HashMap;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use zeroize::Zeroize;

use crate::hash::Hasher;

const MAX_BUFFERS_PER_SIZE: usize = 64;
const MAX_POOLED_HASHERS: usize = 32;

/// Reuse cache of byte buffers keyed by length.
pub struct BytePool {
    buckets: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
}

impl Default for BytePool {
    fn default() -> Self {
        Self::new()
    }
}

impl BytePool {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Return a zeroed buffer of exactly `len` bytes. A cold pool
    /// allocates; acquisition never waits on another caller's work.
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        if let Some(buf) = self
            .buckets
            .lock()
            .get_mut(&len)
            .and_then(|bucket| bucket.pop())
        {
            return buf;
        }
        vec![0u8; len]
    }

    /// Zero `buf` and reinsert it when its size bucket has room.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.zeroize();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(buf.len()).or_default();
        if bucket.len() < MAX_BUFFERS_PER_SIZE {
            bucket.push(buf);
        }
    }

    #[cfg(test)]
    fn pooled(&self, len: usize) -> usize {
        self.buckets.lock().get(&len).map_or(0, Vec::len)
    }
}

/// Bounded stack of reset digest states.
pub struct HasherPool {
    states: Mutex<Vec<Hasher>>,
}

impl Default for HasherPool {
    fn default() -> Self {
        Self::new()
    }
}

impl HasherPool {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(Vec::new()),
        }
    }

    /// Return a state at the initial IV.
    pub fn acquire(&self) -> Hasher {
        self.states.lock().pop().unwrap_or_default()
    }

    /// Reset `state` and reinsert it when the pool has room.
    pub fn release(&self, mut state: Hasher) {
        state.reset();
        let mut states = self.states.lock();
        if states.len() < MAX_POOLED_HASHERS {
            states.push(state);
        }
    }
}

lazy_static! {
    static ref BYTE_POOL: BytePool = BytePool::new();
    static ref HASHER_POOL: HasherPool = HasherPool::new();
}

/// The process-wide byte pool.
pub fn byte_pool() -> &'static BytePool {
    &BYTE_POOL
}

/// The process-wide digest-state pool.
pub fn hasher_pool() -> &'static HasherPool {
    &HASHER_POOL
}
