//! 保留期换算
//!
//! 清理接口、维护循环和数据清理任务共用的保留期上限与截止时间计算。

use chrono::{DateTime, Duration, Utc};

use crate::errors::{JobError, JobResult};

/// 保留期上限：100年
pub const MAX_RETENTION_HOURS: u64 = 100 * 366 * 24;

/// 按小时构造保留期，超过 [`MAX_RETENTION_HOURS`] 时返回 [`JobError::InvalidRetention`]
pub fn retention_from_hours(hours: u64) -> JobResult<Duration> {
    if hours > MAX_RETENTION_HOURS {
        return Err(JobError::InvalidRetention(format!(
            "{hours}小时超过上限{MAX_RETENTION_HOURS}小时"
        )));
    }
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .ok_or_else(|| JobError::InvalidRetention(format!("{hours}小时无法表示")))
}

/// 按天构造保留期
pub fn retention_from_days(days: u32) -> JobResult<Duration> {
    retention_from_hours(u64::from(days) * 24)
}

/// 计算 `now - retention` 的截止时间，超出时间范围时返回 [`JobError::InvalidRetention`]
pub fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> JobResult<DateTime<Utc>> {
    now.checked_sub_signed(retention).ok_or_else(|| {
        JobError::InvalidRetention(format!(
            "{}秒超出可表示的时间范围",
            retention.num_seconds()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_bounds() {
        assert_eq!(retention_from_hours(24).unwrap(), Duration::days(1));
        assert_eq!(
            retention_from_hours(MAX_RETENTION_HOURS).unwrap(),
            Duration::hours(MAX_RETENTION_HOURS as i64)
        );
        assert!(matches!(
            retention_from_hours(MAX_RETENTION_HOURS + 1),
            Err(JobError::InvalidRetention(_))
        ));
        assert!(matches!(
            retention_from_hours(u64::MAX),
            Err(JobError::InvalidRetention(_))
        ));
        assert_eq!(retention_from_days(30).unwrap(), Duration::days(30));
        assert!(retention_from_days(u32::MAX).is_err());
    }

    #[test]
    fn test_retention_cutoff_rejects_out_of_range() {
        let now = Utc::now();
        assert_eq!(
            retention_cutoff(now, Duration::hours(1)).unwrap(),
            now - Duration::hours(1)
        );
        let err = retention_cutoff(now, Duration::seconds(i64::MAX / 1000)).unwrap_err();
        assert!(matches!(err, JobError::InvalidRetention(_)));
    }
}
