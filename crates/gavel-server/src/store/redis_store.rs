//! Redis-backed [`KvStore`] adapter.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Connection, Pool};
use gavel_storage::{KvStore, SetCondition, SetOptions, SetOutcome, StoreError};
use redis::{RedisError, Script};

use crate::config::RedisConfig;

const DEL_IF_EQ: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

const PEXPIRE_IF_EQ: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
";

// PTTL -1 means the key has no expiry, i.e. INCRBYFLOAT just created it.
const INCR_BY_FLOAT: &str = r"
local value = redis.call('INCRBYFLOAT', KEYS[1], ARGV[1])
if redis.call('PTTL', KEYS[1]) == -1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return value
";

const SCAN_COUNT: usize = 200;

/// Store adapter over a deadpool-managed Redis connection pool.
pub struct RedisStore {
    pool: Pool,
    default_ttl: Duration,
    del_if_eq: Script,
    pexpire_if_eq: Script,
    incr_by_float: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("default_ttl", &self.default_ttl)
            .field("pool", &self.pool.status())
            .finish()
    }
}

impl RedisStore {
    pub fn new(pool: Pool, default_ttl: Duration) -> Self {
        Self {
            pool,
            default_ttl,
            del_if_eq: Script::new(DEL_IF_EQ),
            pexpire_if_eq: Script::new(PEXPIRE_IF_EQ),
            incr_by_float: Script::new(INCR_BY_FLOAT),
        }
    }

    /// Builds a pool for `url` using the sizing and timeouts from `config`.
    pub fn from_url(url: &str, config: &RedisConfig) -> Result<Self, StoreError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let mut redis_config = deadpool_redis::Config::from_url(url);
        let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| StoreError::connection(format!("failed to create redis pool: {e}")))?;
        Ok(Self::new(pool, config.default_ttl()))
    }

    /// Round-trips a `PING` to verify the server is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(e, "PING"))?;
        Ok(())
    }

    async fn conn(&self) -> Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::connection(format!("redis pool: {e}")))
    }

    fn ttl_millis(&self, ttl: Option<Duration>) -> u64 {
        ttl.unwrap_or(self.default_ttl).as_millis().max(1) as u64
    }
}

fn redis_error(e: RedisError, key: &str) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        return StoreError::connection(e.to_string());
    }
    if e.code() == Some("WRONGTYPE") {
        return StoreError::wrong_type(key, "other");
    }
    StoreError::command(format!("{key}: {e}"))
}

#[async_trait]
impl KvStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get_buffer(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut conn = self.conn().await?;
        tracing::trace!(key = %key, "redis GET");
        let raw: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(e, key))?;
        Ok(raw.map(Bytes::from))
    }

    async fn set_buffer(
        &self,
        key: &str,
        value: Bytes,
        options: SetOptions,
    ) -> Result<SetOutcome, StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value.as_ref());
        match options.condition {
            SetCondition::Always => {}
            SetCondition::IfNotExists => {
                cmd.arg("NX");
            }
            SetCondition::IfExists => {
                cmd.arg("XX");
            }
        }
        if options.keep_ttl {
            cmd.arg("KEEPTTL");
        } else {
            cmd.arg("PX").arg(self.ttl_millis(options.ttl));
        }

        let mut conn = self.conn().await?;
        tracing::trace!(key = %key, condition = ?options.condition, "redis SET");

        if options.return_old {
            cmd.arg("GET");
            let previous: Option<Vec<u8>> = cmd
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error(e, key))?;
            // With GET the reply is the old value, so `applied` follows from
            // the condition and whether a value existed.
            let applied = match options.condition {
                SetCondition::Always => true,
                SetCondition::IfNotExists => previous.is_none(),
                SetCondition::IfExists => previous.is_some(),
            };
            return Ok(SetOutcome {
                applied,
                previous: previous.map(Bytes::from),
            });
        }

        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(e, key))?;
        Ok(if reply.is_some() {
            SetOutcome::applied()
        } else {
            SetOutcome::skipped()
        })
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        tracing::trace!(key = %key, "redis DEL");
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(e, key))
    }

    async fn sadd(
        &self,
        key: &str,
        members: &[String],
        ttl: Option<Duration>,
    ) -> Result<u64, StoreError> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        tracing::trace!(key = %key, members = members.len(), "redis SADD");
        let added: u64 = redis::cmd("SADD")
            .arg(key)
            .arg(members)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(e, key))?;
        if added > 0 {
            let _: i64 = redis::cmd("PEXPIRE")
                .arg(key)
                .arg(self.ttl_millis(ttl))
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error(e, key))?;
        }
        Ok(added)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        tracing::trace!(key = %key, "redis SMEMBERS");
        redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(e, key))
    }

    async fn incr_by_float(
        &self,
        key: &str,
        amount: f64,
        ttl: Option<Duration>,
    ) -> Result<f64, StoreError> {
        let mut conn = self.conn().await?;
        tracing::trace!(key = %key, amount, "redis INCRBYFLOAT");
        self.incr_by_float
            .key(key)
            .arg(amount)
            .arg(self.ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error(e, key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error(e, pattern))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn del_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = self
            .del_if_eq
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error(e, key))?;
        Ok(removed == 1)
    }

    async fn pexpire_if_eq(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let updated: i64 = self
            .pexpire_if_eq
            .key(key)
            .arg(expected)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error(e, key))?;
        Ok(updated == 1)
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        tracing::debug!("redis FLUSHDB");
        let _: String = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(e, "*"))?;
        Ok(())
    }
}
