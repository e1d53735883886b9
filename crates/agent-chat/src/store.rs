//! The `messages` table: `(id PRIMARY KEY, json, role, hash)`, written
//! incrementally by content hash so re-submitting an unchanged message is
//! a no-op.

use agent_store::AgentStore;
use sha2::{Digest, Sha256};
use sqlx::Row;

use crate::message::{Message, Part, ToolState};
use crate::migration::parse_and_migrate;
use crate::sanitize::{enforce_row_size_cap, sanitize, truncate_non_assistant_message};

fn content_hash(message: &Message) -> String {
    let json = serde_json::to_string(message).unwrap_or_default();
    let digest = Sha256::digest(json.as_bytes());
    format!("{digest:x}")
}

pub struct MessageStore {
    store: AgentStore,
    max_persisted_messages: Option<usize>,
}

impl MessageStore {
    pub fn new(store: AgentStore, max_persisted_messages: Option<usize>) -> Self {
        Self {
            store,
            max_persisted_messages,
        }
    }

    /// Load every row, applying legacy migration and structural
    /// validation. Rows that fail validation are silently dropped.
    pub async fn load(&self) -> agent_store::Result<Vec<Message>> {
        let rows = sqlx::query("SELECT json FROM messages ORDER BY seq ASC")
            .fetch_all(self.store.pool())
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let text: String = row.try_get("json")?;
            let Ok(raw) = serde_json::from_str::<serde_json::Value>(&text) else {
                continue;
            };
            if let Some(message) = parse_and_migrate(&raw) {
                out.push(message);
            }
        }
        Ok(out)
    }

    /// Merge an incoming message against the existing persisted row for
    /// the same id: a client echo of `tool-<name>{state: input-available}`
    /// never clobbers a server-side `output-available` already on disk.
    fn merge_with_existing(existing: &Message, incoming: &mut Message) {
        for part in &mut incoming.parts {
            if let Part::Tool {
                tool_call_id,
                state,
                output,
                ..
            } = part
            {
                if *state == ToolState::InputAvailable && output.is_none() {
                    if let Some(existing_part) = existing.parts.iter().find(|p| p.tool_call_id() == Some(tool_call_id.as_str())) {
                        if let Part::Tool {
                            state: existing_state,
                            output: existing_output,
                            ..
                        } = existing_part
                        {
                            if *existing_state == ToolState::OutputAvailable {
                                *state = ToolState::OutputAvailable;
                                *output = existing_output.clone();
                            }
                        }
                    }
                }
            }
        }
    }

    /// `persistMessages`: sanitize, merge, enforce the row-size guard,
    /// then write only changed rows (compared by content hash). Trims to
    /// `max_persisted_messages` if configured.
    pub async fn persist(&self, mut messages: Vec<Message>) -> agent_store::Result<()> {
        let existing = self.load().await?;

        let mut tx = self.store.pool().begin().await?;

        for (seq, message) in messages.iter_mut().enumerate() {
            if let Some(existing_message) = existing.iter().find(|m| m.id == message.id) {
                Self::merge_with_existing(existing_message, message);
            }

            sanitize(message);
            enforce_row_size_cap(message);
            truncate_non_assistant_message(message);

            let hash = content_hash(message);
            let existing_hash: Option<(String,)> = sqlx::query_as("SELECT hash FROM messages WHERE id = ?1")
                .bind(&message.id)
                .fetch_optional(&mut *tx)
                .await?;

            if existing_hash.as_ref().map(|(h,)| h.as_str()) == Some(hash.as_str()) {
                continue;
            }

            let json = serde_json::to_string(message).unwrap_or_default();
            sqlx::query(
                "INSERT INTO messages (id, json, role, hash, seq) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET json = excluded.json, role = excluded.role, hash = excluded.hash, seq = excluded.seq",
            )
            .bind(&message.id)
            .bind(json)
            .bind(message.role.as_str())
            .bind(hash)
            .bind(seq as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        if let Some(cap) = self.max_persisted_messages {
            self.trim_to(cap).await?;
        }

        Ok(())
    }

    async fn trim_to(&self, cap: usize) -> agent_store::Result<()> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(self.store.pool())
            .await?;
        let excess = count.0 - cap as i64;
        if excess > 0 {
            sqlx::query(
                "DELETE FROM messages WHERE id IN (
                    SELECT id FROM messages ORDER BY seq ASC LIMIT ?1
                )",
            )
            .bind(excess)
            .execute(self.store.pool())
            .await?;
        }
        Ok(())
    }

    pub async fn clear(&self) -> agent_store::Result<()> {
        sqlx::query("DELETE FROM messages").execute(self.store.pool()).await?;
        Ok(())
    }

    pub async fn row_count(&self) -> agent_store::Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(self.store.pool())
            .await?;
        Ok(row.0)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    async fn fresh(cap: Option<usize>) -> MessageStore {
        MessageStore::new(AgentStore::open_in_memory().await.unwrap(), cap)
    }

    #[tokio::test]
    async fn persist_then_reload_round_trips() {
        let store = fresh(None).await;
        let message = Message::text(Role::User, "m1", "hello");
        store.persist(vec![message]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "m1");
    }

    #[tokio::test]
    async fn resubmitting_unchanged_message_is_a_no_op() {
        let store = fresh(None).await;
        let message = Message::text(Role::User, "m1", "hello");
        store.persist(vec![message.clone()]).await.unwrap();
        let hash_before: (String,) = sqlx::query_as("SELECT hash FROM messages WHERE id = 'm1'")
            .fetch_one(store.store.pool())
            .await
            .unwrap();

        store.persist(vec![message]).await.unwrap();
        let hash_after: (String,) = sqlx::query_as("SELECT hash FROM messages WHERE id = 'm1'")
            .fetch_one(store.store.pool())
            .await
            .unwrap();

        assert_eq!(hash_before.0, hash_after.0);
        assert_eq!(store.row_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn changed_content_updates_exactly_that_row() {
        let store = fresh(None).await;
        store.persist(vec![Message::text(Role::User, "m1", "hello")]).await.unwrap();
        store.persist(vec![Message::text(Role::User, "m2", "world")]).await.unwrap();
        store.persist(vec![Message::text(Role::User, "m1", "hello again")]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        let m1 = loaded.iter().find(|m| m.id == "m1").unwrap();
        match &m1.parts[0] {
            Part::Text { text } => assert_eq!(text, "hello again"),
            _ => panic!("expected text part"),
        }
    }

    #[tokio::test]
    async fn client_echo_never_clobbers_server_output() {
        let store = fresh(None).await;
        let mut server_message = Message {
            id: "m1".to_string(),
            role: Role::Assistant,
            parts: vec![Part::Tool {
                tool_name: "search".to_string(),
                tool_call_id: "c1".to_string(),
                state: ToolState::OutputAvailable,
                input: serde_json::json!({}),
                output: Some(serde_json::json!({"ok": true})),
                call_provider_metadata: None,
            }],
            metadata: None,
        };
        store.persist(vec![server_message.clone()]).await.unwrap();

        // Client echoes back the tool call as merely input-available,
        // without the output (it never saw it).
        server_message.parts[0] = Part::Tool {
            tool_name: "search".to_string(),
            tool_call_id: "c1".to_string(),
            state: ToolState::InputAvailable,
            input: serde_json::json!({}),
            output: None,
            call_provider_metadata: None,
        };
        store.persist(vec![server_message]).await.unwrap();

        let loaded = store.load().await.unwrap();
        match &loaded[0].parts[0] {
            Part::Tool { state, output, .. } => {
                assert_eq!(*state, ToolState::OutputAvailable);
                assert_eq!(output, &Some(serde_json::json!({"ok": true})));
            }
            _ => panic!("expected tool part"),
        }
    }

    #[tokio::test]
    async fn trims_to_max_persisted_messages() {
        let store = fresh(Some(2)).await;
        store.persist(vec![Message::text(Role::User, "m1", "a")]).await.unwrap();
        store.persist(vec![Message::text(Role::User, "m2", "b")]).await.unwrap();
        store.persist(vec![Message::text(Role::User, "m3", "c")]).await.unwrap();

        assert_eq!(store.row_count().await.unwrap(), 2);
        let loaded = store.load().await.unwrap();
        let ids: Vec<_> = loaded.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec!["m2".to_string(), "m3".to_string()]);
    }

    #[tokio::test]
    async fn malformed_row_is_dropped_on_load() {
        let store = fresh(None).await;
        sqlx::query("INSERT INTO messages (id, json, role, hash, seq) VALUES ('bad', '{\"role\":\"user\"}', 'user', 'h', 0)")
            .execute(store.store.pool())
            .await
            .unwrap();
        let loaded = store.load().await.unwrap();
        assert!(loaded.is_empty());
    }
}
