//! In-memory job store
//!
//! Mirrors the Redis semantics the queue relies on (TTL expiry, sorted set
//! ordering, atomic pop) inside a single mutex. Used by tests and by
//! single-process deployments without Redis.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fleet_jobs_core::traits::JobStore;
use fleet_jobs_core::{JobError, JobResult};
use tokio::sync::Mutex;

/// Expired plain keys are swept after this many writes
const SWEEP_EVERY_WRITES: u32 = 256;

#[derive(Debug)]
struct ValueEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl ValueEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    values: HashMap<String, ValueEntry>,
    sorted_sets: HashMap<String, HashMap<String, f64>>,
    writes_since_sweep: u32,
}

impl StoreState {
    fn insert_value(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        self.values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        self.writes_since_sweep += 1;
        if self.writes_since_sweep >= SWEEP_EVERY_WRITES {
            self.sweep_expired();
        }
    }

    fn sweep_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.values.len();
        self.values.retain(|_, e| !e.is_expired(now));
        self.writes_since_sweep = 0;
        before - self.values.len()
    }

    fn live_value(&mut self, key: &str) -> Option<&ValueEntry> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|e| e.is_expired(now)) {
            self.values.remove(key);
        }
        self.values.get(key)
    }

    /// Members in ascending (score, member) order, as Redis ranks them
    fn sorted_members(&self, key: &str) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> = self
            .sorted_sets
            .get(key)
            .map(|set| set.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        members
    }
}

/// In-memory implementation of [`JobStore`]
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: Mutex<StoreState>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live plain keys, for tests
    pub async fn key_count(&self) -> usize {
        let now = Instant::now();
        let state = self.state.lock().await;
        state.values.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Number of plain keys held in memory, expired or not
    pub async fn stored_key_count(&self) -> usize {
        self.state.lock().await.values.len()
    }

    /// Drop every expired plain key now, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        self.state.lock().await.sweep_expired()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn ping(&self) -> JobResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> JobResult<Option<String>> {
        let mut state = self.state.lock().await;
        Ok(state.live_value(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> JobResult<()> {
        let mut state = self.state.lock().await;
        state.insert_value(key, value, ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> JobResult<bool> {
        let mut state = self.state.lock().await;
        if state.live_value(key).is_some() {
            return Ok(false);
        }
        state.insert_value(key, value, ttl);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> JobResult<bool> {
        let mut state = self.state.lock().await;
        let live = state.live_value(key).is_some();
        state.values.remove(key);
        let set_removed = state.sorted_sets.remove(key).is_some();
        Ok(live || set_removed)
    }

    async fn exists(&self, key: &str) -> JobResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state.live_value(key).is_some() || state.sorted_sets.contains_key(key))
    }

    async fn incr(&self, key: &str) -> JobResult<i64> {
        let mut state = self.state.lock().await;
        let current = match state.live_value(key) {
            Some(entry) => entry.value.parse::<i64>().map_err(|_| {
                JobError::Storage(format!("value at {key} is not an integer"))
            })?,
            None => 0,
        };
        let next = current + 1;
        let expires_at = state.values.get(key).and_then(|e| e.expires_at);
        state.values.insert(
            key.to_string(),
            ValueEntry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn scan_prefix(&self, prefix: &str) -> JobResult<Vec<String>> {
        let now = Instant::now();
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state
            .values
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .chain(
                state
                    .sorted_sets
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned(),
            )
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> JobResult<()> {
        let mut state = self.state.lock().await;
        state
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zadd_existing(&self, key: &str, member: &str, score: f64) -> JobResult<bool> {
        let mut state = self.state.lock().await;
        let Some(current) = state
            .sorted_sets
            .get_mut(key)
            .and_then(|set| set.get_mut(member))
        else {
            return Ok(false);
        };
        let changed = *current != score;
        *current = score;
        Ok(changed)
    }

    async fn zrem(&self, key: &str, member: &str) -> JobResult<bool> {
        let mut state = self.state.lock().await;
        let Some(set) = state.sorted_sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member).is_some();
        if set.is_empty() {
            state.sorted_sets.remove(key);
        }
        Ok(removed)
    }

    async fn zpopmax(&self, key: &str) -> JobResult<Option<(String, f64)>> {
        let mut state = self.state.lock().await;
        let Some(top) = state.sorted_members(key).pop() else {
            return Ok(None);
        };
        if let Some(set) = state.sorted_sets.get_mut(key) {
            set.remove(&top.0);
            if set.is_empty() {
                state.sorted_sets.remove(key);
            }
        }
        Ok(Some(top))
    }

    async fn zscore(&self, key: &str, member: &str) -> JobResult<Option<f64>> {
        let state = self.state.lock().await;
        Ok(state
            .sorted_sets
            .get(key)
            .and_then(|set| set.get(member))
            .copied())
    }

    async fn zcard(&self, key: &str) -> JobResult<u64> {
        let state = self.state.lock().await;
        Ok(state.sorted_sets.get(key).map_or(0, |set| set.len() as u64))
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<usize>,
    ) -> JobResult<Vec<(String, f64)>> {
        let state = self.state.lock().await;
        let members = state
            .sorted_members(key)
            .into_iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(members)
    }

    async fn zrevrange(
        &self,
        key: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> JobResult<Vec<(String, f64)>> {
        let state = self.state.lock().await;
        let members = state
            .sorted_members(key)
            .into_iter()
            .rev()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(members)
    }

    async fn zremrange_by_rank(&self, key: &str, start: i64, stop: i64) -> JobResult<u64> {
        let mut state = self.state.lock().await;
        let members = state.sorted_members(key);
        let len = members.len() as i64;
        let normalize = |index: i64| if index < 0 { len + index } else { index };
        let start = normalize(start).max(0);
        let stop = normalize(stop).min(len - 1);
        if len == 0 || start > stop {
            return Ok(0);
        }

        let Some(set) = state.sorted_sets.get_mut(key) else {
            return Ok(0);
        };
        for (member, _) in &members[start as usize..=stop as usize] {
            set.remove(member);
        }
        if set.is_empty() {
            state.sorted_sets.remove(key);
        }
        Ok((stop - start + 1) as u64)
    }
}
