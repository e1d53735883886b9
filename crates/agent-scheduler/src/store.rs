use agent_store::AgentStore;
use sqlx::Row;

use crate::error::Result;
use crate::types::Schedule;

/// Reads and writes the `schedules` table. Each row stores its schedule as
/// a JSON blob (`payload` column reused as the encoded body) keyed by id —
/// the same upsert-by-id pattern the teacher's cron store uses for its
/// job table.
pub struct ScheduleStore {
    store: AgentStore,
}

impl ScheduleStore {
    pub fn new(store: AgentStore) -> Self {
        Self { store }
    }

    pub async fn load_all(&self) -> Result<Vec<Schedule>> {
        let rows = sqlx::query("SELECT payload FROM schedules")
            .fetch_all(self.store.pool())
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let text: String = row.try_get("payload")?;
            out.push(serde_json::from_str(&text)?);
        }
        Ok(out)
    }

    pub async fn save(&self, schedule: &Schedule) -> Result<()> {
        let text = serde_json::to_string(schedule)?;
        let kind_label = match &schedule.kind {
            crate::types::ScheduleKind::Scheduled { .. } => "scheduled",
            crate::types::ScheduleKind::Delayed { .. } => "delayed",
            crate::types::ScheduleKind::Cron { .. } => "cron",
        };
        sqlx::query(
            "INSERT INTO schedules (id, callback, type, time, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                callback = excluded.callback,
                type = excluded.type,
                time = excluded.time,
                payload = excluded.payload",
        )
        .bind(&schedule.id)
        .bind(&schedule.callback)
        .bind(kind_label)
        .bind(schedule.next_run_ms.map(|v| v as i64))
        .bind(text)
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM schedules WHERE id = ?1")
            .bind(id)
            .execute(self.store.pool())
            .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScheduleKind;

    async fn fresh() -> ScheduleStore {
        ScheduleStore::new(AgentStore::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn save_and_load_round_trips() {
        let store = fresh().await;
        let schedule = Schedule {
            id: "a".to_string(),
            callback: "onTick".to_string(),
            kind: ScheduleKind::Scheduled { time_ms: 1000 },
            payload: serde_json::json!("hi"),
            next_run_ms: Some(1000),
        };
        store.save(&schedule).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded, vec![schedule]);
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let store = fresh().await;
        let schedule = Schedule {
            id: "a".to_string(),
            callback: "onTick".to_string(),
            kind: ScheduleKind::Scheduled { time_ms: 1000 },
            payload: serde_json::Value::Null,
            next_run_ms: Some(1000),
        };
        store.save(&schedule).await.unwrap();
        store.delete("a").await.unwrap();

        assert!(store.load_all().await.unwrap().is_empty());
    }
}
