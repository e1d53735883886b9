use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::schedule::compute_next_run;
use crate::store::ScheduleStore;
use crate::types::{Schedule, ScheduleKind};

const DEFAULT_POLL_MS: u64 = 60_000;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Invoked once per due schedule. Mirrors `callback(payload, Schedule)` —
/// `callback_name` is `Schedule::callback`, letting one agent register
/// several distinct schedule callbacks under different names.
#[async_trait]
pub trait ScheduleCallback: Send + Sync {
    async fn call(&self, callback_name: &str, payload: Value, schedule: &Schedule);
}

/// A single alarm-based dispatch loop over the durable `schedules` table.
/// One instance per agent; the dispatch order within one tick is
/// non-decreasing by due time, ties broken by table order (insertion
/// order), matching the ordering guarantee in the concurrency model.
pub struct Scheduler {
    store: ScheduleStore,
    schedules: RwLock<Vec<Schedule>>,
    last_run_ms: RwLock<std::collections::HashMap<String, u64>>,
    wake_notify: Arc<Notify>,
    running: RwLock<bool>,
    on_fire: Arc<dyn ScheduleCallback>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(store: ScheduleStore, on_fire: Arc<dyn ScheduleCallback>) -> Arc<Self> {
        Arc::new(Self {
            store,
            schedules: RwLock::new(Vec::new()),
            last_run_ms: RwLock::new(std::collections::HashMap::new()),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
            on_fire,
            timer_handle: Mutex::new(None),
        })
    }

    /// Load persisted schedules and spawn the timer loop. Idempotent.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut running = self.running.write().await;
            if *running {
                return Ok(());
            }
            *running = true;
        }
        let loaded = self.store.load_all().await?;
        *self.schedules.write().await = loaded;

        let this = self.clone();
        let handle = tokio::spawn(async move { this.timer_loop().await });
        *self.timer_handle.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_one();
        if let Some(handle) = self.timer_handle.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn list_schedules(&self) -> Vec<Schedule> {
        self.schedules.read().await.clone()
    }

    pub async fn cancel_task(&self, id: &str) -> Result<()> {
        self.schedules.write().await.retain(|s| s.id != id);
        self.store.delete(id).await?;
        Ok(())
    }

    async fn insert(&self, callback: &str, kind: ScheduleKind, payload: Value) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let next_run_ms = compute_next_run(&kind, now_ms(), None)?;
        let schedule = Schedule {
            id: id.clone(),
            callback: callback.to_string(),
            kind,
            payload,
            next_run_ms,
        };
        self.store.save(&schedule).await?;
        self.schedules.write().await.push(schedule);
        self.wake_notify.notify_one();
        Ok(id)
    }

    pub async fn schedule_task(&self, delay_seconds: u64, payload: Value) -> Result<String> {
        let time_ms = now_ms().saturating_add(delay_seconds.saturating_mul(1000));
        self.insert("scheduleTask", ScheduleKind::Scheduled { time_ms }, payload).await
    }

    pub async fn schedule_recurring(&self, interval_seconds: u64, label: impl Into<String>) -> Result<String> {
        self.insert(
            "scheduleRecurring",
            ScheduleKind::Delayed {
                interval_seconds,
                recurring: true,
            },
            Value::String(label.into()),
        )
        .await
    }

    pub async fn schedule_cron(&self, cron_expr: impl Into<String>, payload: Value) -> Result<String> {
        self.insert(
            "scheduleCron",
            ScheduleKind::Cron {
                expr: cron_expr.into(),
                tz: None,
            },
            payload,
        )
        .await
    }

    async fn ms_until_next_wake(&self) -> u64 {
        let schedules = self.schedules.read().await;
        let earliest = schedules.iter().filter_map(|s| s.next_run_ms).min();
        match earliest {
            Some(at) => {
                let now = now_ms();
                at.saturating_sub(now)
            }
            None => DEFAULT_POLL_MS,
        }
    }

    async fn timer_loop(self: Arc<Self>) {
        loop {
            if !*self.running.read().await {
                return;
            }
            let wait = self.ms_until_next_wake().await.min(DEFAULT_POLL_MS);
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(wait)) => {}
                _ = self.wake_notify.notified() => {}
            }
            if !*self.running.read().await {
                return;
            }
            self.process_due_jobs().await;
        }
    }

    /// Collects every schedule whose `next_run_ms` has passed and, in the
    /// same locked pass, clears `next_run_ms` on those entries so a
    /// re-scan before `execute` updates them doesn't pick the same row up
    /// twice. Entries come out sorted by due time (ties by table order),
    /// matching the ordering guarantee, and are dispatched one at a time
    /// rather than concurrently so that guarantee actually holds.
    async fn process_due_jobs(self: &Arc<Self>) {
        let now = now_ms();
        let due: Vec<Schedule> = {
            let mut schedules = self.schedules.write().await;
            let mut due = Vec::new();
            for schedule in schedules.iter_mut() {
                if schedule.next_run_ms.is_some_and(|t| t <= now) {
                    due.push(schedule.clone());
                    schedule.next_run_ms = None;
                }
            }
            due.sort_by_key(|s| s.next_run_ms);
            due
        };

        for schedule in due {
            self.clone().execute(schedule).await;
        }
    }

    async fn execute(self: Arc<Self>, schedule: Schedule) {
        info!(id = %schedule.id, callback = %schedule.callback, "schedule firing");
        self.on_fire.call(&schedule.callback, schedule.payload.clone(), &schedule).await;
        self.last_run_ms.write().await.insert(schedule.id.clone(), now_ms());

        let recurring = schedule.kind.is_recurring();
        if !recurring {
            if let Err(err) = self.cancel_task(&schedule.id).await {
                warn!(id = %schedule.id, %err, "failed to remove one-shot schedule after firing");
            }
            return;
        }

        let last_run = self.last_run_ms.read().await.get(&schedule.id).copied();
        let next_run_ms = match compute_next_run(&schedule.kind, now_ms(), last_run) {
            Ok(next) => next,
            Err(err) => {
                error!(id = %schedule.id, %err, "failed to compute next run, disabling schedule");
                None
            }
        };

        let mut schedules = self.schedules.write().await;
        if let Some(entry) = schedules.iter_mut().find(|s| s.id == schedule.id) {
            entry.next_run_ms = next_run_ms;
            if let Err(err) = self.store.save(entry).await {
                error!(id = %schedule.id, %err, "failed to persist recomputed schedule");
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use agent_store::AgentStore;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingCallback {
        calls: StdMutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ScheduleCallback for CountingCallback {
        async fn call(&self, callback_name: &str, payload: Value, _schedule: &Schedule) {
            self.calls.lock().unwrap().push((callback_name.to_string(), payload));
        }
    }

    async fn fresh_scheduler(callback: Arc<CountingCallback>) -> Arc<Scheduler> {
        let store = ScheduleStore::new(AgentStore::open_in_memory().await.unwrap());
        Scheduler::new(store, callback)
    }

    #[tokio::test]
    async fn schedule_task_fires_once_then_disappears() {
        let callback = Arc::new(CountingCallback::default());
        let scheduler = fresh_scheduler(callback.clone()).await;
        scheduler.start().await.unwrap();

        scheduler.schedule_task(0, serde_json::json!("hi")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;

        assert_eq!(callback.calls.lock().unwrap().len(), 1);
        assert!(scheduler.list_schedules().await.is_empty());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn cancel_task_removes_before_it_fires() {
        let callback = Arc::new(CountingCallback::default());
        let scheduler = fresh_scheduler(callback.clone()).await;
        scheduler.start().await.unwrap();

        let id = scheduler.schedule_task(60, serde_json::json!("later")).await.unwrap();
        scheduler.cancel_task(&id).await.unwrap();

        assert!(scheduler.list_schedules().await.is_empty());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn recurring_schedule_is_kept_after_firing() {
        let callback = Arc::new(CountingCallback::default());
        let scheduler = fresh_scheduler(callback.clone()).await;
        scheduler.start().await.unwrap();

        scheduler.schedule_recurring(0, "tick").await.unwrap();
        // interval_seconds=0 never computes a next run (guarded in compute_next_run),
        // so it fires once and its next_run_ms becomes None without being deleted.
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;

        let schedules = scheduler.list_schedules().await;
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].next_run_ms, None);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn schedules_survive_a_restart() {
        let store_db = AgentStore::open_in_memory().await.unwrap();
        let callback = Arc::new(CountingCallback::default());

        let scheduler = Scheduler::new(ScheduleStore::new(store_db.clone()), callback.clone());
        scheduler.start().await.unwrap();
        scheduler.schedule_task(60, serde_json::json!("persisted")).await.unwrap();
        scheduler.stop().await;

        let restarted = Scheduler::new(ScheduleStore::new(store_db), callback);
        restarted.start().await.unwrap();
        assert_eq!(restarted.list_schedules().await.len(), 1);
        restarted.stop().await;
    }
}
