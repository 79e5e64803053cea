//! Cache tier over a Redis list.
//!
//! One list-valued key per group, named exactly after the group. Values
//! are left-pushed in increasing order and right-popped, so pops come out
//! ascending. Connections are pre-built into a [`ConnPool`] at provider
//! construction; a Redis that is unreachable at startup fails the host.

use std::time::Duration;

use redis::Commands;
use tracing::{info, warn};

use crate::error::IdError;
use crate::locks::GroupLocks;
use crate::pool::ConnPool;
use crate::provider::{CacheProvider, check_group, check_range};

/// How long an operation waits for a pooled connection.
const POOL_TIMEOUT: Duration = Duration::from_millis(100);

/// Values pushed per LPUSH round-trip when materializing a block.
const PUSH_CHUNK: usize = 1024;

pub struct RedisParams {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub password: Option<String>,
    pub pool_size: u16,
}

pub struct RedisCacheProvider {
    name: String,
    locks: GroupLocks,
    pool: ConnPool<redis::Connection>,
}

impl RedisCacheProvider {
    pub fn new(params: RedisParams) -> Result<Self, IdError> {
        if params.pool_size == 0 {
            return Err(IdError::InvalidArgument(
                "redis pool size must be at least 1".to_string(),
            ));
        }
        info!(
            "initializing redis cache provider '{}' at {}:{} (pool_size={})",
            params.name, params.ip, params.port, params.pool_size
        );
        let connection_info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(params.ip.clone(), params.port),
            redis: redis::RedisConnectionInfo {
                password: params.password.clone(),
                ..Default::default()
            },
        };
        let client = redis::Client::open(connection_info)
            .map_err(|e| IdError::BackendUnavailable(format!("redis client setup failed: {}", e)))?;
        let pool = ConnPool::new(usize::from(params.pool_size), || {
            client
                .get_connection()
                .map_err(|e| IdError::BackendUnavailable(format!("redis connection failed: {}", e)))
        })?;
        Ok(Self {
            name: params.name,
            locks: GroupLocks::new(),
            pool,
        })
    }

    /// Runs `op` with a pooled connection, returning it on every path.
    fn with_conn<R>(
        &self,
        what: &str,
        op: impl FnOnce(&mut redis::Connection) -> Result<R, IdError>,
    ) -> Result<R, IdError> {
        let mut conn = self.pool.get(POOL_TIMEOUT).ok_or_else(|| {
            IdError::BackendUnavailable(format!("no redis connection available for {}", what))
        })?;
        let result = op(&mut conn);
        if !self.pool.put(conn, POOL_TIMEOUT) {
            warn!("returning a redis connection to the pool timed out");
        }
        result
    }
}

impl CacheProvider for RedisCacheProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_list(&self, group: &str, begin: u64, end: u64) -> Result<bool, IdError> {
        check_group(group)?;
        let lock = self.locks.of(group);
        let _guard = lock.write().unwrap();
        check_range(begin, end)?;
        self.with_conn("build_list", |conn| {
            let exists: bool = conn
                .exists(group)
                .map_err(|e| backend(format!("EXISTS {}", group), e))?;
            if exists {
                let removed: i64 = conn
                    .del(group)
                    .map_err(|e| backend(format!("DEL {}", group), e))?;
                if removed < 1 {
                    warn!("redis DEL {} removed nothing", group);
                }
            }
            let mut batch: Vec<u64> = Vec::with_capacity(PUSH_CHUNK.min((end - begin) as usize));
            for id in begin..end {
                batch.push(id);
                if batch.len() == PUSH_CHUNK {
                    let _: i64 = conn
                        .lpush(group, batch.as_slice())
                        .map_err(|e| backend(format!("LPUSH {}", group), e))?;
                    batch.clear();
                }
            }
            if !batch.is_empty() {
                let _: i64 = conn
                    .lpush(group, batch.as_slice())
                    .map_err(|e| backend(format!("LPUSH {}", group), e))?;
            }
            Ok(())
        })?;
        info!(
            "built the id list of group '{}' (begin={}, end={})",
            group, begin, end
        );
        Ok(true)
    }

    fn pop(&self, group: &str) -> Result<u64, IdError> {
        check_group(group)?;
        let lock = self.locks.of(group);
        let _guard = lock.read().unwrap();
        self.with_conn("pop", |conn| {
            let value: Option<String> = conn
                .rpop(group, None)
                .map_err(|e| backend(format!("RPOP {}", group), e))?;
            match value {
                None => Err(IdError::EmptyList {
                    group: group.to_string(),
                }),
                Some(raw) => raw.parse::<u64>().map_err(|e| {
                    IdError::BackendCorruption(format!(
                        "cannot parse '{}' popped from group '{}': {}",
                        raw, group, e
                    ))
                }),
            }
        })
    }

    fn clear(&self, group: &str) -> Result<bool, IdError> {
        check_group(group)?;
        let lock = self.locks.of(group);
        let _guard = lock.read().unwrap();
        self.with_conn("clear", |conn| {
            let removed: i64 = conn
                .del(group)
                .map_err(|e| backend(format!("DEL {}", group), e))?;
            info!("cleared the id list of group '{}' (existed={})", group, removed > 0);
            Ok(true)
        })
    }
}

fn backend(command: String, err: redis::RedisError) -> IdError {
    IdError::BackendUnavailable(format!("redis {}: {}", command, err))
}
