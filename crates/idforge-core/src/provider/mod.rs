//! Backend tier contracts and implementations.
//!
//! An id group lives in two places at once: a durable counter row in the
//! storage tier and a queue of pre-issued identifiers in the cache tier.
//! The two capabilities are separate traits so a provider registers for
//! exactly what it implements; there is no runtime type inspection.
//!
//! Implementations:
//! - `redis_cache` — cache tier over a Redis list
//! - `mysql_storage` — storage tier over a MySQL table
//! - `memory` — both tiers in process memory, for tests and embedding

pub mod memory;
pub mod mysql_storage;
pub mod redis_cache;

use chrono::{DateTime, Utc};

use crate::error::IdError;

pub use memory::{MemoryCacheProvider, MemoryStorageProvider};
pub use mysql_storage::{MysqlParams, MysqlStorageProvider};
pub use redis_cache::{RedisCacheProvider, RedisParams};

/// Durable allocation state of one group.
///
/// `begin`/`end` bound the current block (half-open); `count` is the
/// number of blocks advanced so far. A freshly built row has
/// `count = begin = end = 0`: the first propel derives its block from
/// `start`, not from `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub name: String,
    pub start: u64,
    pub step: u32,
    pub count: u64,
    pub begin: u64,
    pub end: u64,
    pub last_modified: DateTime<Utc>,
}

/// A block of identifiers reserved by one propel: `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub begin: u64,
    pub end: u64,
}

/// Fast tier: a FIFO of unissued identifiers per group.
pub trait CacheProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Replaces the group's list with the values of `[begin, end)` so that
    /// subsequent pops return them in ascending order. Returns `Ok(true)`
    /// on success.
    fn build_list(&self, group: &str, begin: u64, end: u64) -> Result<bool, IdError>;

    /// Removes and returns the head of the group's list. An exhausted or
    /// missing list is [`IdError::EmptyList`].
    fn pop(&self, group: &str) -> Result<u64, IdError>;

    /// Deletes the group's list. Absence is success.
    fn clear(&self, group: &str) -> Result<bool, IdError>;
}

/// Durable tier: one allocation record per group.
pub trait StorageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Creates the group's record with `count = begin = end = 0`.
    /// Returns `Ok(false)` without error when the record already exists.
    fn build_info(&self, group: &str, start: u64, step: u32) -> Result<bool, IdError>;

    /// Reads the group's record; `Ok(None)` when it is absent.
    fn get(&self, group: &str) -> Result<Option<GroupInfo>, IdError>;

    /// Advances the counter by one step and returns the new current block.
    /// `Ok(None)` when the group does not exist.
    fn propel(&self, group: &str) -> Result<Option<IdRange>, IdError>;

    /// Deletes the group's record. Absence is success.
    fn clear(&self, group: &str) -> Result<bool, IdError>;
}

/// Computes the block a propel moves to, given the current record.
///
/// A record that has never been propelled (`count == 0`) starts its first
/// block at `start`; afterwards blocks are contiguous from `end`.
pub(crate) fn next_range(info: &GroupInfo) -> IdRange {
    let (begin, end) = if info.count == 0 {
        (info.start, info.start + u64::from(info.step))
    } else {
        (info.end, info.end + u64::from(info.step))
    };
    IdRange { begin, end }
}

pub(crate) fn check_group(group: &str) -> Result<(), IdError> {
    if group.is_empty() {
        return Err(IdError::InvalidArgument("the group name is empty".to_string()));
    }
    Ok(())
}

pub(crate) fn check_range(begin: u64, end: u64) -> Result<(), IdError> {
    if begin == 0 || end == 0 || begin >= end {
        return Err(IdError::InvalidArgument(format!(
            "invalid id range (begin={}, end={})",
            begin, end
        )));
    }
    Ok(())
}
