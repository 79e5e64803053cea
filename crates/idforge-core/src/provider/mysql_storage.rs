//! Storage tier over a MySQL table.
//!
//! One row per group in the `group` table:
//!
//! ```sql
//! CREATE TABLE `group` (
//!   `name`          VARCHAR(64)     NOT NULL PRIMARY KEY,
//!   `start`         BIGINT UNSIGNED NOT NULL,
//!   `step`          INT UNSIGNED    NOT NULL,
//!   `count`         BIGINT UNSIGNED NOT NULL,
//!   `begin`         BIGINT UNSIGNED NOT NULL,
//!   `end`           BIGINT UNSIGNED NOT NULL,
//!   `creation_dt`   TIMESTAMP       NULL,
//!   `last_modified` TIMESTAMP       NULL
//! );
//! ```
//!
//! `build_info` seeds a row with `count = begin = end = 0`; the first
//! propel then derives its block from `start`. Propel's read-modify-write
//! runs under the group's writer lock, which serializes block advancement
//! within this process. Deployments running several service instances
//! against one database must serialize per-group updates themselves.

use std::time::Duration;

use mysql::prelude::Queryable;
use tracing::{info, warn};

use crate::error::IdError;
use crate::locks::GroupLocks;
use crate::pool::ConnPool;
use crate::provider::{GroupInfo, IdRange, StorageProvider, check_group, next_range};

const POOL_TIMEOUT: Duration = Duration::from_millis(100);

const TABLE_NAME: &str = "group";

pub struct MysqlParams {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub db_name: String,
    pub user: String,
    pub password: String,
    pub pool_size: u16,
}

pub struct MysqlStorageProvider {
    name: String,
    locks: GroupLocks,
    pool: ConnPool<mysql::Conn>,
}

impl MysqlStorageProvider {
    pub fn new(params: MysqlParams) -> Result<Self, IdError> {
        if params.pool_size == 0 {
            return Err(IdError::InvalidArgument(
                "mysql pool size must be at least 1".to_string(),
            ));
        }
        info!(
            "initializing mysql storage provider '{}' at {}:{}/{} (pool_size={})",
            params.name, params.ip, params.port, params.db_name, params.pool_size
        );
        let opts = mysql::OptsBuilder::new()
            .ip_or_hostname(Some(params.ip.clone()))
            .tcp_port(params.port)
            .user(Some(params.user.clone()))
            .pass(Some(params.password.clone()))
            .db_name(Some(params.db_name.clone()));
        let pool = ConnPool::new(usize::from(params.pool_size), || {
            mysql::Conn::new(opts.clone())
                .map_err(|e| IdError::BackendUnavailable(format!("mysql connection failed: {}", e)))
        })?;
        Ok(Self {
            name: params.name,
            locks: GroupLocks::new(),
            pool,
        })
    }

    fn with_conn<R>(
        &self,
        what: &str,
        op: impl FnOnce(&mut mysql::Conn) -> Result<R, IdError>,
    ) -> Result<R, IdError> {
        let mut conn = self.pool.get(POOL_TIMEOUT).ok_or_else(|| {
            IdError::BackendUnavailable(format!("no mysql connection available for {}", what))
        })?;
        let result = op(&mut conn);
        if !self.pool.put(conn, POOL_TIMEOUT) {
            warn!("returning a mysql connection to the pool timed out");
        }
        result
    }

    fn fetch(&self, conn: &mut mysql::Conn, group: &str) -> Result<Option<GroupInfo>, IdError> {
        let sql = format!(
            "SELECT `start`, `step`, `count`, `begin`, `end`, UNIX_TIMESTAMP(`last_modified`) \
             FROM `{}` WHERE `name` = ?",
            TABLE_NAME
        );
        let row: Option<(u64, u32, u64, u64, u64, Option<i64>)> = conn
            .exec_first(&sql, (group,))
            .map_err(|e| backend(format!("select group '{}'", group), e))?;
        Ok(row.map(|(start, step, count, begin, end, modified)| GroupInfo {
            name: group.to_string(),
            start,
            step,
            count,
            begin,
            end,
            last_modified: modified
                .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
                .unwrap_or_default(),
        }))
    }
}

impl StorageProvider for MysqlStorageProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_info(&self, group: &str, start: u64, step: u32) -> Result<bool, IdError> {
        check_group(group)?;
        if step == 0 {
            return Err(IdError::InvalidArgument("step must be at least 1".to_string()));
        }
        self.with_conn("build_info", |conn| {
            if self.fetch(conn, group)?.is_some() {
                warn!("group '{}' already exists, skipping info build", group);
                return Ok(false);
            }
            let sql = format!(
                "INSERT INTO `{}` (`name`, `start`, `step`, `count`, `begin`, `end`, `creation_dt`) \
                 VALUES (?, ?, ?, 0, 0, 0, NOW())",
                TABLE_NAME
            );
            conn.exec_drop(&sql, (group, start, step))
                .map_err(|e| backend(format!("insert group '{}'", group), e))?;
            Ok(true)
        })
    }

    fn get(&self, group: &str) -> Result<Option<GroupInfo>, IdError> {
        check_group(group)?;
        self.with_conn("get", |conn| self.fetch(conn, group))
    }

    fn propel(&self, group: &str) -> Result<Option<IdRange>, IdError> {
        check_group(group)?;
        let lock = self.locks.of(group);
        let _guard = lock.write().unwrap();
        self.with_conn("propel", |conn| {
            let Some(record) = self.fetch(conn, group)? else {
                warn!("group '{}' does not exist, skipping propel", group);
                return Ok(None);
            };
            let range = next_range(&record);
            let sql = format!(
                "UPDATE `{}` SET `begin` = ?, `end` = ?, `count` = ?, `last_modified` = NOW() \
                 WHERE `name` = ?",
                TABLE_NAME
            );
            conn.exec_drop(&sql, (range.begin, range.end, record.count + 1, group))
                .map_err(|e| backend(format!("update group '{}'", group), e))?;
            Ok(Some(range))
        })
    }

    fn clear(&self, group: &str) -> Result<bool, IdError> {
        check_group(group)?;
        let lock = self.locks.of(group);
        let _guard = lock.read().unwrap();
        self.with_conn("clear", |conn| {
            let sql = format!("DELETE FROM `{}` WHERE `name` = ?", TABLE_NAME);
            conn.exec_drop(&sql, (group,))
                .map_err(|e| backend(format!("delete group '{}'", group), e))?;
            let existed = conn.affected_rows() > 0;
            info!("cleared group '{}' (existed={})", group, existed);
            Ok(true)
        })
    }
}

fn backend(operation: String, err: mysql::Error) -> IdError {
    IdError::BackendUnavailable(format!("mysql {}: {}", operation, err))
}
