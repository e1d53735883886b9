use std::str::FromStr;

use chrono::TimeZone;
use cron::Schedule as CronSchedule;

use crate::error::{Error, Result};
use crate::types::ScheduleKind;

/// Compute the next fire time (epoch ms), or `None` if the schedule will
/// never fire again (a past `Scheduled` time).
pub fn compute_next_run(kind: &ScheduleKind, now_ms: u64, last_run_ms: Option<u64>) -> Result<Option<u64>> {
    match kind {
        ScheduleKind::Scheduled { time_ms } => {
            if *time_ms > now_ms {
                Ok(Some(*time_ms))
            } else {
                Ok(None)
            }
        }
        ScheduleKind::Delayed {
            interval_seconds,
            recurring,
        } => {
            let interval_ms = interval_seconds.saturating_mul(1000);
            if interval_ms == 0 {
                return Ok(None);
            }
            if !*recurring {
                return Ok(Some(now_ms.saturating_add(interval_ms)));
            }
            let base = last_run_ms.unwrap_or(now_ms);
            Ok(Some(base.saturating_add(interval_ms)))
        }
        ScheduleKind::Cron { expr, tz } => compute_cron_next(expr, tz.as_deref(), now_ms),
    }
}

fn pad_cron_expr(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {expr} *")
    } else {
        expr.to_string()
    }
}

fn compute_cron_next(expr: &str, tz: Option<&str>, now_ms: u64) -> Result<Option<u64>> {
    let padded = pad_cron_expr(expr);
    let schedule = CronSchedule::from_str(&padded)?;

    let tz: chrono_tz::Tz = match tz {
        Some(name) => name
            .parse()
            .map_err(|_| Error::UnknownTimezone(name.to_string()))?,
        None => chrono_tz::UTC,
    };

    let now = tz
        .timestamp_millis_opt(now_ms as i64)
        .single()
        .ok_or_else(|| Error::UnknownTimezone(tz.to_string()))?;

    Ok(schedule
        .after(&now)
        .next()
        .map(|dt| dt.timestamp_millis() as u64))
}
