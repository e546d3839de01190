//! Redis-backed stock counter.
//!
//! Keys follow `coupon:{event}:remain` (string integer) and
//! `coupon:{event}:applied` (set of account ids). Compound steps run as Lua
//! scripts or MULTI pipelines so each method is one atomic round trip.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use super::{CounterError, StockCounter, applied_key, remain_key};
use crate::model::{AccountId, EventId};

/// DECR only if the key exists, so an unseeded event never shows stock.
const TAKE: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
return redis.call('DECR', KEYS[1])
";

/// INCR only for an account still marked as applied, and only on seeded stock.
const ROLLBACK: &str = r"
if redis.call('SREM', KEYS[2], ARGV[1]) == 1 and redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('INCR', KEYS[1])
end
return 1
";

const RESTORE: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('INCR', KEYS[1])
end
return 1
";

#[derive(Clone)]
pub struct RedisCounter {
    conn_manager: ConnectionManager,
}

impl RedisCounter {
    /// Connect to `redis_url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn new(redis_url: &str) -> Result<Self, CounterError> {
        let client = Client::open(redis_url).map_err(unavailable)?;
        let conn_manager = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self { conn_manager })
    }
}

fn unavailable(e: redis::RedisError) -> CounterError {
    CounterError::Unavailable(e.to_string())
}

#[async_trait]
impl StockCounter for RedisCounter {
    async fn seed(&self, event: EventId, total: u32) -> Result<(), CounterError> {
        let mut conn = self.conn_manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .set(remain_key(event), total)
            .ignore()
            .del(applied_key(event))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn mark_applied(
        &self,
        event: EventId,
        account: AccountId,
    ) -> Result<bool, CounterError> {
        let mut conn = self.conn_manager.clone();
        let added: i64 = conn
            .sadd(applied_key(event), account)
            .await
            .map_err(unavailable)?;
        Ok(added == 1)
    }

    async fn take(&self, event: EventId) -> Result<Option<i64>, CounterError> {
        let mut conn = self.conn_manager.clone();
        Script::new(TAKE)
            .key(remain_key(event))
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn rollback(&self, event: EventId, account: AccountId) -> Result<(), CounterError> {
        let mut conn = self.conn_manager.clone();
        let _: i64 = Script::new(ROLLBACK)
            .key(remain_key(event))
            .key(applied_key(event))
            .arg(account)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn restore(&self, event: EventId) -> Result<(), CounterError> {
        let mut conn = self.conn_manager.clone();
        let _: i64 = Script::new(RESTORE)
            .key(remain_key(event))
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn remaining(&self, event: EventId) -> Result<Option<i64>, CounterError> {
        let mut conn = self.conn_manager.clone();
        conn.get(remain_key(event)).await.map_err(unavailable)
    }
}
