use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::debug;

use fleet_jobs_core::models::Job;
use fleet_jobs_core::traits::JobStore;
use fleet_jobs_core::JobResult;
use fleet_jobs_infrastructure::keys::dedup_key;

/// 指纹占用结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// 指纹由本次提交占用
    Acquired(String),
    /// 去重窗口内已有相同指纹
    Duplicate(String),
}

/// 基于指纹的重复提交检测
///
/// 指纹由任务类型、公司ID和载荷数据的规范化JSON计算SHA-256得到，
/// 在去重窗口内相同指纹的任务视为重复。
pub struct Deduplicator {
    store: Arc<dyn JobStore>,
    prefix: String,
    window: Duration,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn JobStore>, prefix: impl Into<String>, window: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 计算任务指纹（十六进制SHA-256）
    pub fn fingerprint(job: &Job) -> JobResult<String> {
        let company = job
            .company_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let data = job.payload.canonical_data()?;

        let mut hasher = Sha256::new();
        hasher.update(job.job_type().as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(company.as_bytes());
        hasher.update(b"|");
        hasher.update(data.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// 去重窗口内是否已有相同指纹的任务
    pub async fn is_duplicate(&self, job: &Job) -> JobResult<bool> {
        let fingerprint = Self::fingerprint(job)?;
        self.store
            .exists(&dedup_key(&self.prefix, &fingerprint))
            .await
    }

    /// 记录指纹，过期时间为去重窗口
    pub async fn mark_as_processed(&self, job: &Job) -> JobResult<String> {
        let fingerprint = Self::fingerprint(job)?;
        self.store
            .set(
                &dedup_key(&self.prefix, &fingerprint),
                &job.id,
                Some(self.window),
            )
            .await?;
        debug!("记录任务指纹: {} -> {}", job.id, fingerprint);
        Ok(fingerprint)
    }

    /// 原子地占用指纹，过期时间为去重窗口
    ///
    /// 检查与写入是同一条 `SET NX`，并发的相同提交只有一个能占用成功。
    pub async fn try_claim(&self, job: &Job) -> JobResult<Claim> {
        let fingerprint = Self::fingerprint(job)?;
        let acquired = self
            .store
            .set_if_absent(
                &dedup_key(&self.prefix, &fingerprint),
                &job.id,
                Some(self.window),
            )
            .await?;
        if acquired {
            debug!("占用任务指纹: {} -> {}", job.id, fingerprint);
            Ok(Claim::Acquired(fingerprint))
        } else {
            Ok(Claim::Duplicate(fingerprint))
        }
    }

    /// 释放已占用的指纹，用于入队失败后的回滚
    pub async fn release(&self, fingerprint: &str) -> JobResult<bool> {
        self.store.delete(&dedup_key(&self.prefix, fingerprint)).await
    }

    /// 提前清除任务的指纹
    pub async fn clear(&self, job: &Job) -> JobResult<bool> {
        let fingerprint = Self::fingerprint(job)?;
        self.release(&fingerprint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_jobs_core::models::{InvoiceGenerationData, JobPayload};
    use fleet_jobs_infrastructure::InMemoryJobStore;

    fn invoice(company_id: i64, period: &str) -> Job {
        Job::new(JobPayload::InvoiceGeneration(InvoiceGenerationData {
            billing_period: Some(period.to_string()),
            company_ids: vec![company_id],
            send_email: true,
        }))
        .with_company(company_id)
    }

    #[test]
    fn test_fingerprint_inputs() {
        let a = Deduplicator::fingerprint(&invoice(1, "2026-09")).unwrap();
        let same = Deduplicator::fingerprint(&invoice(1, "2026-09")).unwrap();
        assert_eq!(a, same);
        assert_eq!(a.len(), 64);

        let other_period = Deduplicator::fingerprint(&invoice(1, "2026-10")).unwrap();
        assert_ne!(a, other_period);

        let mut other_company = invoice(1, "2026-09");
        other_company.company_id = Some(2);
        assert_ne!(a, Deduplicator::fingerprint(&other_company).unwrap());
    }

    #[test]
    fn test_fingerprint_ignores_priority_and_tags() {
        let base = invoice(1, "2026-09");
        let tweaked = base
            .clone()
            .with_priority(fleet_jobs_core::models::JobPriority::CRITICAL)
            .with_tag("manual");
        assert_eq!(
            Deduplicator::fingerprint(&base).unwrap(),
            Deduplicator::fingerprint(&tweaked).unwrap()
        );
    }

    #[tokio::test]
    async fn test_duplicate_within_window_then_expires() {
        let dedup = Deduplicator::new(
            Arc::new(InMemoryJobStore::new()),
            "job",
            Duration::from_millis(100),
        );
        let job = invoice(5, "2026-09");
        assert!(!dedup.is_duplicate(&job).await.unwrap());

        assert!(matches!(dedup.try_claim(&job).await.unwrap(), Claim::Acquired(_)));
        assert!(dedup.is_duplicate(&job).await.unwrap());
        assert!(!dedup.is_duplicate(&invoice(6, "2026-09")).await.unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!dedup.is_duplicate(&job).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_fingerprint() {
        let dedup = Deduplicator::new(
            Arc::new(InMemoryJobStore::new()),
            "job",
            Duration::from_secs(60),
        );
        let job = invoice(5, "2026-09");
        dedup.mark_as_processed(&job).await.unwrap();
        assert!(matches!(dedup.try_claim(&job).await.unwrap(), Claim::Duplicate(_)));
        assert!(dedup.clear(&job).await.unwrap());
        assert!(!dedup.is_duplicate(&job).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_admit_exactly_one() {
        let dedup = Arc::new(Deduplicator::new(
            Arc::new(InMemoryJobStore::new()),
            "job",
            Duration::from_secs(60),
        ));
        let claims = (0..16).map(|_| {
            let dedup = dedup.clone();
            tokio::spawn(async move { dedup.try_claim(&invoice(9, "2026-09")).await.unwrap() })
        });

        let mut acquired = 0;
        for claim in futures::future::join_all(claims).await {
            if matches!(claim.unwrap(), Claim::Acquired(_)) {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
    }

    #[tokio::test]
    async fn test_release_frees_fingerprint() {
        let dedup = Deduplicator::new(
            Arc::new(InMemoryJobStore::new()),
            "job",
            Duration::from_secs(60),
        );
        let job = invoice(3, "2026-09");
        let Claim::Acquired(fingerprint) = dedup.try_claim(&job).await.unwrap() else {
            panic!("first claim must succeed");
        };
        assert_eq!(dedup.try_claim(&job).await.unwrap(), Claim::Duplicate(fingerprint.clone()));
        assert!(dedup.release(&fingerprint).await.unwrap());
        assert!(matches!(dedup.try_claim(&job).await.unwrap(), Claim::Acquired(_)));
    }
}
