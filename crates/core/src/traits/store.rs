//! 共享存储接口
//!
//! 队列、调度器、去重器和指标收集器共用的键值/有序集合存储抽象。
//! 语义与Redis对应命令保持一致：每个操作都是单键原子操作，
//! 不使用跨键事务。

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::JobResult;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// 连通性检查
    async fn ping(&self) -> JobResult<()>;

    /// `GET key`
    async fn get(&self, key: &str) -> JobResult<Option<String>>;

    /// `SET key value [EX ttl]`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> JobResult<()>;

    /// `SET key value NX [EX ttl]`：键不存在时写入，返回是否写入
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> JobResult<bool>;

    /// `DEL key`，返回键是否存在
    async fn delete(&self, key: &str) -> JobResult<bool>;

    /// `EXISTS key`
    async fn exists(&self, key: &str) -> JobResult<bool>;

    /// `INCR key`
    async fn incr(&self, key: &str) -> JobResult<i64>;

    /// 列出以 `prefix` 开头的所有键（`SCAN MATCH prefix*`）
    async fn scan_prefix(&self, prefix: &str) -> JobResult<Vec<String>>;

    /// `ZADD key score member`
    async fn zadd(&self, key: &str, member: &str, score: f64) -> JobResult<()>;

    /// `ZADD key XX CH score member`：仅更新已存在的成员，返回是否更新
    async fn zadd_existing(&self, key: &str, member: &str, score: f64) -> JobResult<bool>;

    /// `ZREM key member`，返回成员是否被移除
    async fn zrem(&self, key: &str, member: &str) -> JobResult<bool>;

    /// `ZPOPMAX key`：原子地弹出分数最高的成员
    async fn zpopmax(&self, key: &str) -> JobResult<Option<(String, f64)>>;

    /// `ZSCORE key member`
    async fn zscore(&self, key: &str, member: &str) -> JobResult<Option<f64>>;

    /// `ZCARD key`
    async fn zcard(&self, key: &str) -> JobResult<u64>;

    /// `ZRANGEBYSCORE key min max WITHSCORES [LIMIT 0 n]`，按分数升序
    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<usize>,
    ) -> JobResult<Vec<(String, f64)>>;

    /// `ZREVRANGE key offset offset+limit-1 WITHSCORES`，按分数降序；`limit` 为空表示全部
    async fn zrevrange(
        &self,
        key: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> JobResult<Vec<(String, f64)>>;

    /// `ZREMRANGEBYRANK key start stop`，支持负数下标
    async fn zremrange_by_rank(&self, key: &str, start: i64, stop: i64) -> JobResult<u64>;
}
