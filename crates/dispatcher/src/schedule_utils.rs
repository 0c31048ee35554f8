use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use tracing::debug;

use fleet_jobs_core::{JobError, JobResult};

/// 字面时长的上限（366天）
pub const MAX_INTERVAL_MS: f64 = 366.0 * 24.0 * 3_600_000.0;

/// 定时任务的调度规则
///
/// - `@hourly` / `@daily` / `@weekly` / `@monthly`：下一个整点 / UTC零点 / 周一零点 / 下月一日零点
/// - 字面时长，如 `90m`、`1h30m`、`45s`、`250ms`：当前时间加上该时长
/// - 其余字符串按CRON表达式解析（秒 分 时 日 月 周 [年]）
#[derive(Debug, Clone)]
pub enum Schedule {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Every(Duration),
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    pub fn parse(expr: &str) -> JobResult<Self> {
        let expr = expr.trim();
        let schedule = match expr {
            "@hourly" => Schedule::Hourly,
            "@daily" | "@midnight" => Schedule::Daily,
            "@weekly" => Schedule::Weekly,
            "@monthly" => Schedule::Monthly,
            _ => {
                if let Some(every) = parse_duration(expr) {
                    Schedule::Every(every)
                } else {
                    let cron = cron::Schedule::from_str(expr).map_err(|e| {
                        JobError::InvalidSchedule {
                            expr: expr.to_string(),
                            message: format!("既不是时长也不是CRON表达式: {e}"),
                        }
                    })?;
                    Schedule::Cron(Box::new(cron))
                }
            }
        };
        debug!("解析调度规则: {} -> {:?}", expr, schedule);
        Ok(schedule)
    }

    /// 计算 `now` 之后的下一次触发时间
    pub fn next_run(&self, now: DateTime<Utc>) -> JobResult<DateTime<Utc>> {
        let next = match self {
            Schedule::Hourly => {
                let hour_start = Utc
                    .with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), 0, 0)
                    .single();
                hour_start.and_then(|start| start.checked_add_signed(Duration::hours(1)))
            }
            Schedule::Daily => now
                .date_naive()
                .succ_opt()
                .and_then(|day| day.and_hms_opt(0, 0, 0))
                .map(|midnight| midnight.and_utc()),
            Schedule::Weekly => {
                let days_ahead = 7 - i64::from(now.weekday().num_days_from_monday());
                now.date_naive()
                    .checked_add_signed(Duration::days(days_ahead))
                    .and_then(|monday| monday.and_hms_opt(0, 0, 0))
                    .map(|monday| monday.and_utc())
            }
            Schedule::Monthly => {
                let (year, month) = if now.month() == 12 {
                    (now.year() + 1, 1)
                } else {
                    (now.year(), now.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
                    .and_then(|day| day.and_hms_opt(0, 0, 0))
                    .map(|first| first.and_utc())
            }
            Schedule::Every(every) => now.checked_add_signed(*every),
            Schedule::Cron(cron) => cron.after(&now).next(),
        };

        next.ok_or_else(|| JobError::InvalidSchedule {
            expr: format!("{self:?}"),
            message: "无法计算下一次执行时间".to_string(),
        })
    }
}

/// 解析字面时长，支持 `h`、`m`、`s`、`ms` 单位的组合，数值可带小数
///
/// 结果必须为正且不超过 [`MAX_INTERVAL_MS`]，否则返回 `None`。
pub fn parse_duration(input: &str) -> Option<Duration> {
    if input.is_empty() {
        return None;
    }

    let mut total_ms = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let factor = match &rest[..unit_len] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_ms += value * factor;
    }

    if !(1.0..=MAX_INTERVAL_MS).contains(&total_ms) {
        return None;
    }
    Some(Duration::milliseconds(total_ms.round() as i64))
}

/// 校验调度表达式
pub fn validate_schedule(expr: &str) -> JobResult<()> {
    Schedule::parse(expr).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_symbolic_boundaries() {
        // 2026-10-14 是周三
        let now = at(2026, 10, 14, 9, 41, 7);
        let next = |expr: &str| Schedule::parse(expr).unwrap().next_run(now).unwrap();

        assert_eq!(next("@hourly"), at(2026, 10, 14, 10, 0, 0));
        assert_eq!(next("@daily"), at(2026, 10, 15, 0, 0, 0));
        assert_eq!(next("@weekly"), at(2026, 10, 19, 0, 0, 0));
        assert_eq!(next("@monthly"), at(2026, 11, 1, 0, 0, 0));
    }

    #[test]
    fn test_boundaries_roll_over() {
        let new_year_eve = at(2026, 12, 31, 23, 30, 0);
        assert_eq!(
            Schedule::Hourly.next_run(new_year_eve).unwrap(),
            at(2027, 1, 1, 0, 0, 0)
        );
        assert_eq!(
            Schedule::Monthly.next_run(new_year_eve).unwrap(),
            at(2027, 1, 1, 0, 0, 0)
        );

        let monday = at(2026, 10, 19, 0, 0, 0);
        assert_eq!(
            Schedule::Weekly.next_run(monday).unwrap(),
            at(2026, 10, 26, 0, 0, 0)
        );
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90m"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("45s"), Some(Duration::seconds(45)));
        assert_eq!(parse_duration("250ms"), Some(Duration::milliseconds(250)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("m"), None);
        assert_eq!(parse_duration("5 days"), None);
        assert_eq!(parse_duration("8784h"), Some(Duration::days(366)));
        assert_eq!(parse_duration("8785h"), None);
        assert_eq!(parse_duration("99999999999h"), None);
        assert_eq!(parse_duration(&"9".repeat(400)), None);
    }

    #[test]
    fn test_literal_duration_adds_to_now() {
        let now = at(2026, 10, 14, 9, 0, 0);
        let schedule = Schedule::parse("90m").unwrap();
        assert_eq!(schedule.next_run(now).unwrap(), at(2026, 10, 14, 10, 30, 0));
    }

    #[test]
    fn test_next_run_near_max_date_errors() {
        for schedule in [
            Schedule::Every(Duration::days(1)),
            Schedule::Hourly,
            Schedule::Daily,
            Schedule::Weekly,
            Schedule::Monthly,
        ] {
            assert!(matches!(
                schedule.next_run(DateTime::<Utc>::MAX_UTC),
                Err(JobError::InvalidSchedule { .. })
            ));
        }
    }

    #[test]
    fn test_cron_fallback() {
        let now = at(2026, 10, 14, 9, 0, 0);
        let schedule = Schedule::parse("0 30 2 * * *").unwrap();
        assert!(matches!(schedule, Schedule::Cron(_)));
        assert_eq!(schedule.next_run(now).unwrap(), at(2026, 10, 15, 2, 30, 0));
    }

    #[test]
    fn test_invalid_schedule() {
        for expr in ["", "@yearly-ish", "every tuesday", "-5m", "99999999999h", "367d"] {
            assert!(
                matches!(
                    Schedule::parse(expr),
                    Err(JobError::InvalidSchedule { .. })
                ),
                "{expr} should be rejected"
            );
        }
    }
}
