//! Redis-backed job store

use std::time::Duration;

use async_trait::async_trait;
use fleet_jobs_core::config::RedisConfig;
use fleet_jobs_core::traits::JobStore;
use fleet_jobs_core::{JobError, JobResult};
use redis::aio::ConnectionManager;
use redis::RedisError;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

fn storage_error(operation: &'static str) -> impl Fn(RedisError) -> JobError {
    move |e| JobError::Storage(format!("Redis {operation} failed: {e}"))
}

/// Redis sorted set bound; Redis wants `-inf`/`+inf` spelled out
fn score_bound(value: f64) -> String {
    if value == f64::INFINITY {
        "+inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        value.to_string()
    }
}

/// [`JobStore`] over a multiplexed Redis connection
///
/// The connection manager reconnects on its own; clones share one connection.
#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
}

impl RedisJobStore {
    /// Connect with retry, then verify the connection with PING
    pub async fn connect(config: &RedisConfig) -> JobResult<Self> {
        info!("Connecting to Redis at {}", config.url);

        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            JobError::Configuration(format!("Failed to create Redis client: {e}"))
        })?;

        let mut last_error = None;
        for attempt in 0..config.max_retry_attempts {
            let attempt_result =
                tokio::time::timeout(config.connection_timeout(), client.get_connection_manager())
                    .await;
            match attempt_result {
                Ok(Ok(conn)) => {
                    let store = Self { conn };
                    store.ping().await?;
                    if attempt > 0 {
                        debug!("Connected to Redis after {} attempts", attempt + 1);
                    }
                    info!("Redis job store connected");
                    return Ok(store);
                }
                Ok(Err(e)) => last_error = Some(e.to_string()),
                Err(_) => last_error = Some("connection timed out".to_string()),
            }

            if attempt + 1 < config.max_retry_attempts {
                warn!(
                    "Failed to connect to Redis (attempt {}/{}): {}. Retrying in {}ms...",
                    attempt + 1,
                    config.max_retry_attempts,
                    last_error.as_deref().unwrap_or("unknown"),
                    config.retry_delay_ms
                );
                sleep(config.retry_delay()).await;
            }
        }

        let error_msg = format!(
            "Failed to connect to Redis after {} attempts. Last error: {}",
            config.max_retry_attempts,
            last_error.unwrap_or_else(|| "unknown".to_string())
        );
        error!("{}", error_msg);
        Err(JobError::Storage(error_msg))
    }

    fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn ping(&self) -> JobResult<()> {
        let mut conn = self.connection();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(storage_error("PING"))?;
        if response != "PONG" {
            return Err(JobError::Storage(format!(
                "Unexpected PING response: {response}"
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> JobResult<Option<String>> {
        let mut conn = self.connection();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("GET"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> JobResult<()> {
        let mut conn = self.connection();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = cmd
            .query_async(&mut conn)
            .await
            .map_err(storage_error("SET"))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> JobResult<bool> {
        let mut conn = self.connection();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        // 未写入时返回 nil
        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(storage_error("SET NX"))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> JobResult<bool> {
        let mut conn = self.connection();
        let deleted: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("DEL"))?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> JobResult<bool> {
        let mut conn = self.connection();
        let count: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("EXISTS"))?;
        Ok(count > 0)
    }

    async fn incr(&self, key: &str) -> JobResult<i64> {
        let mut conn = self.connection();
        let value: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("INCR"))?;
        Ok(value)
    }

    async fn scan_prefix(&self, prefix: &str) -> JobResult<Vec<String>> {
        let mut conn = self.connection();
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(format!("{prefix}*"))
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await
                .map_err(storage_error("SCAN"))?;
            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> JobResult<()> {
        let mut conn = self.connection();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("ZADD"))?;
        Ok(())
    }

    async fn zadd_existing(&self, key: &str, member: &str, score: f64) -> JobResult<bool> {
        let mut conn = self.connection();
        let changed: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg("XX")
            .arg("CH")
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("ZADD XX"))?;
        Ok(changed > 0)
    }

    async fn zrem(&self, key: &str, member: &str) -> JobResult<bool> {
        let mut conn = self.connection();
        let removed: i64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("ZREM"))?;
        Ok(removed > 0)
    }

    async fn zpopmax(&self, key: &str) -> JobResult<Option<(String, f64)>> {
        let mut conn = self.connection();
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMAX")
            .arg(key)
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("ZPOPMAX"))?;
        Ok(popped.into_iter().next())
    }

    async fn zscore(&self, key: &str, member: &str) -> JobResult<Option<f64>> {
        let mut conn = self.connection();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("ZSCORE"))?;
        Ok(score)
    }

    async fn zcard(&self, key: &str) -> JobResult<u64> {
        let mut conn = self.connection();
        let count: u64 = redis::cmd("ZCARD")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("ZCARD"))?;
        Ok(count)
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<usize>,
    ) -> JobResult<Vec<(String, f64)>> {
        let mut conn = self.connection();
        let mut cmd = redis::cmd("ZRANGEBYSCORE");
        cmd.arg(key)
            .arg(score_bound(min))
            .arg(score_bound(max))
            .arg("WITHSCORES");
        if let Some(limit) = limit {
            cmd.arg("LIMIT").arg(0).arg(limit);
        }
        let members: Vec<(String, f64)> = cmd
            .query_async(&mut conn)
            .await
            .map_err(storage_error("ZRANGEBYSCORE"))?;
        Ok(members)
    }

    async fn zrevrange(
        &self,
        key: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> JobResult<Vec<(String, f64)>> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }
        let stop: i64 = match limit {
            Some(limit) => (offset + limit - 1) as i64,
            None => -1,
        };
        let mut conn = self.connection();
        let members: Vec<(String, f64)> = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(offset)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .map_err(storage_error("ZREVRANGE"))?;
        Ok(members)
    }

    async fn zremrange_by_rank(&self, key: &str, start: i64, stop: i64) -> JobResult<u64> {
        let mut conn = self.connection();
        let removed: u64 = redis::cmd("ZREMRANGEBYRANK")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(storage_error("ZREMRANGEBYRANK"))?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounds() {
        assert_eq!(score_bound(f64::NEG_INFINITY), "-inf");
        assert_eq!(score_bound(f64::INFINITY), "+inf");
        assert_eq!(score_bound(1500.0), "1500");
    }
}
