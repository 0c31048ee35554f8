use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use fleet_jobs_core::models::{JobPriority, JobStatus};
use fleet_jobs_dispatcher::PriorityAdjuster;
use fleet_jobs_infrastructure::{InMemoryJobStore, JobQueue};
use fleet_jobs_testing_utils::JobBuilder;

const JOBS: usize = 300;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_during_dequeue_leaves_no_stranded_jobs() {
    let queue = JobQueue::new(
        Arc::new(InMemoryJobStore::new()),
        "adjust_race_queue",
        Duration::from_secs(3600),
    );
    let stale = Utc::now() - chrono::Duration::hours(2);
    let mut ids = Vec::with_capacity(JOBS);
    for i in 0..JOBS {
        let priority = if i % 2 == 0 {
            JobPriority::LOW
        } else {
            JobPriority::NORMAL
        };
        let job = queue
            .enqueue(
                JobBuilder::notification()
                    .with_priority(priority)
                    .with_created_at(stale)
                    .build(),
            )
            .await
            .unwrap();
        ids.push(job.id);
    }

    let sweeper = {
        let adjuster = PriorityAdjuster::new(queue.clone());
        tokio::spawn(async move {
            for _ in 0..20 {
                adjuster.adjust_all_priorities(Utc::now()).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let workers = (0..4).map(|_| {
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut done = 0;
            while let Some(job) = queue.dequeue().await.unwrap() {
                queue.complete(&job.id, None).await.unwrap();
                done += 1;
            }
            done
        })
    });

    let completed: usize = futures::future::join_all(workers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .sum();
    sweeper.await.unwrap();

    assert_eq!(completed, JOBS);
    let stats = queue.get_queue_stats().await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.completed, JOBS as u64);
    for id in ids {
        let job = queue.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}
