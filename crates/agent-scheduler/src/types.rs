use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three schedule kinds named by the data model. `Scheduled` is always
/// one-shot (it comes from `scheduleTask(delaySeconds, ...)`); `Delayed`
/// carries `recurring` because it backs both a one-shot delay and
/// `scheduleRecurring`; `Cron` is always recurring.
///
/// Decision (recorded in DESIGN.md): the spec's vocabulary `{scheduled,
/// delayed, cron}` has only three kinds but the operations section names
/// four intents (`scheduleTask`, `scheduleRecurring`, `scheduleCron`, plus
/// implicit one-shot-vs-recurring). We fold `scheduleTask` into `scheduled`
/// (one-shot, absolute time) and `scheduleRecurring` into `delayed` with
/// `recurring: true` (interval re-armed after every fire).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScheduleKind {
    Scheduled {
        time_ms: u64,
    },
    Delayed {
        interval_seconds: u64,
        recurring: bool,
    },
    Cron {
        expr: String,
        tz: Option<String>,
    },
}

impl ScheduleKind {
    pub fn is_recurring(&self) -> bool {
        match self {
            ScheduleKind::Scheduled { .. } => false,
            ScheduleKind::Delayed { recurring, .. } => *recurring,
            ScheduleKind::Cron { .. } => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: String,
    pub callback: String,
    pub kind: ScheduleKind,
    pub payload: Value,
    pub next_run_ms: Option<u64>,
}
