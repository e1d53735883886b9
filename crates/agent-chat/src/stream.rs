//! Resumable streaming: at most one active assistant stream per agent,
//! buffered with sequence numbers, replayable from `lastSeq + 1` after a
//! reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agent_common::{Broadcaster, ConnectionId, Error, Result};
use agent_protocol::{STREAM_FLUSH_BATCH, frame::StreamFrameEnvelope};
use agent_store::AgentStore;
use serde_json::Value;
use sqlx::Row;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Snapshot persisted alongside an active stream so a continuation
/// (auto-continue after a client tool result) can resume with the same
/// request body and client tool set, even across a hibernation.
#[derive(Debug, Clone)]
pub struct StreamMeta {
    pub request_id: String,
    pub body: Value,
    pub client_tools: Option<Value>,
}

struct ActiveStream {
    stream_id: String,
    request_id: String,
    next_seq: AtomicU64,
}

pub struct StreamManager {
    store: AgentStore,
    broadcaster: Arc<dyn Broadcaster>,
    active: RwLock<Option<ActiveStream>>,
    pending_flush: Mutex<Vec<StreamFrameEnvelope>>,
}

impl StreamManager {
    pub async fn load(store: AgentStore, broadcaster: Arc<dyn Broadcaster>) -> Result<Self> {
        let row: Option<(Option<String>, Option<String>)> =
            sqlx::query_as("SELECT active_stream_id, active_request_id FROM agent_state WHERE id = 0")
                .fetch_optional(store.pool())
                .await
                .map_err(agent_store::Error::from)?;

        let active = match row {
            Some((Some(stream_id), Some(request_id))) => {
                let next_seq = Self::max_seq(&store, &stream_id).await?.map(|s| s + 1).unwrap_or(0);
                Some(ActiveStream {
                    stream_id,
                    request_id,
                    next_seq: AtomicU64::new(next_seq),
                })
            }
            _ => None,
        };

        Ok(Self {
            store,
            broadcaster,
            active: RwLock::new(active),
            pending_flush: Mutex::new(Vec::new()),
        })
    }

    async fn max_seq(store: &AgentStore, stream_id: &str) -> Result<Option<u64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT MAX(seq) FROM stream_chunks WHERE stream_id = ?1")
            .bind(stream_id)
            .fetch_optional(store.pool())
            .await
            .map_err(agent_store::Error::from)?;
        Ok(row.and_then(|(v,)| if v >= 0 { Some(v as u64) } else { None }))
    }

    pub async fn active_ids(&self) -> Option<(String, String)> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|a| (a.stream_id.clone(), a.request_id.clone()))
    }

    /// Begin a new active stream. Errors with `conflict` if one is
    /// already active — at most one assistant stream is active per agent.
    pub async fn start_stream(&self, request_id: impl Into<String>, meta: &StreamMeta) -> Result<String> {
        let mut guard = self.active.write().await;
        if guard.is_some() {
            return Err(Error::conflict("a stream is already active for this agent"));
        }
        let stream_id = Uuid::new_v4().to_string();
        let request_id = request_id.into();

        sqlx::query(
            "INSERT INTO stream_meta (id, request_id, body, client_tools) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&stream_id)
        .bind(&request_id)
        .bind(serde_json::to_string(&meta.body).unwrap_or_default())
        .bind(meta.client_tools.as_ref().map(|v| serde_json::to_string(v).unwrap_or_default()))
        .execute(self.store.pool())
        .await
        .map_err(agent_store::Error::from)?;

        sqlx::query(
            "INSERT INTO agent_state (id, state, active_stream_id, active_request_id)
             VALUES (0, '{}', ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET active_stream_id = excluded.active_stream_id, active_request_id = excluded.active_request_id",
        )
        .bind(&stream_id)
        .bind(&request_id)
        .execute(self.store.pool())
        .await
        .map_err(agent_store::Error::from)?;

        *guard = Some(ActiveStream {
            stream_id: stream_id.clone(),
            request_id,
            next_seq: AtomicU64::new(0),
        });
        Ok(stream_id)
    }

    /// Buffer one outgoing frame body, assigning it the next sequence
    /// number, broadcast it live, and flush to SQL once `STREAM_FLUSH_BATCH`
    /// frames have accumulated.
    pub async fn push_chunk(&self, requesting_conn: ConnectionId, chat_request_id: &str, body: Value) -> Result<()> {
        let seq = {
            let guard = self.active.read().await;
            let Some(active) = guard.as_ref() else {
                return Err(Error::conflict("no active stream"));
            };
            active.next_seq.fetch_add(1, Ordering::SeqCst)
        };

        self.broadcaster
            .send_to(
                requesting_conn,
                serde_json::json!({"type": "chat-response", "id": chat_request_id, "frame": body}),
            )
            .await;

        let mut pending = self.pending_flush.lock().await;
        pending.push(StreamFrameEnvelope { seq, body });
        if pending.len() >= STREAM_FLUSH_BATCH {
            let batch = std::mem::take(&mut *pending);
            drop(pending);
            self.flush_batch(batch).await?;
        }
        Ok(())
    }

    async fn flush_batch(&self, batch: Vec<StreamFrameEnvelope>) -> Result<()> {
        let Some((stream_id, _)) = self.active_ids().await else {
            return Ok(());
        };
        let mut tx = self.store.pool().begin().await.map_err(agent_store::Error::from)?;
        for envelope in batch {
            sqlx::query(
                "INSERT INTO stream_chunks (stream_id, seq, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(stream_id, seq) DO UPDATE SET body = excluded.body",
            )
            .bind(&stream_id)
            .bind(envelope.seq as i64)
            .bind(serde_json::to_string(&envelope.body).unwrap_or_default())
            .execute(&mut *tx)
            .await
            .map_err(agent_store::Error::from)?;
        }
        tx.commit().await.map_err(agent_store::Error::from)?;
        Ok(())
    }

    /// Flush any remaining buffered frames (call this on stream
    /// completion, before clearing active ids).
    pub async fn flush_pending(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.pending_flush.lock().await);
        if !batch.is_empty() {
            self.flush_batch(batch).await?;
        }
        Ok(())
    }

    /// Normal completion: flush, clear the active stream markers, leave
    /// historical chunks/metadata in place (only `chat-clear` wipes them).
    pub async fn finish_stream(&self) -> Result<()> {
        self.flush_pending().await?;
        sqlx::query("UPDATE agent_state SET active_stream_id = NULL, active_request_id = NULL WHERE id = 0")
            .execute(self.store.pool())
            .await
            .map_err(agent_store::Error::from)?;
        *self.active.write().await = None;
        Ok(())
    }

    /// Replay chunks with `seq > last_seq` for the active stream, in
    /// order. Returns an empty vec if there is no active stream.
    pub async fn replay_since(&self, last_seq: u64) -> Result<Vec<StreamFrameEnvelope>> {
        let Some((stream_id, _)) = self.active_ids().await else {
            return Ok(Vec::new());
        };
        self.flush_pending().await?;
        let rows = sqlx::query("SELECT seq, body FROM stream_chunks WHERE stream_id = ?1 AND seq > ?2 ORDER BY seq ASC")
            .bind(&stream_id)
            .bind(last_seq as i64)
            .fetch_all(self.store.pool())
            .await
            .map_err(agent_store::Error::from)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let seq: i64 = row.try_get("seq").map_err(agent_store::Error::from)?;
            let body_text: String = row.try_get("body").map_err(agent_store::Error::from)?;
            out.push(StreamFrameEnvelope {
                seq: seq as u64,
                body: serde_json::from_str(&body_text)?,
            });
        }
        Ok(out)
    }

    /// `chat-clear`: wipe the chat log's chunks, stream metadata, and the
    /// active stream markers. The messages table itself is cleared by the
    /// caller (`ChatEngine`), which owns both stores.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM stream_chunks").execute(self.store.pool()).await.map_err(agent_store::Error::from)?;
        sqlx::query("DELETE FROM stream_meta").execute(self.store.pool()).await.map_err(agent_store::Error::from)?;
        sqlx::query(
            "UPDATE agent_state SET active_stream_id = NULL, active_request_id = NULL, custom_body = NULL WHERE id = 0",
        )
        .execute(self.store.pool())
        .await
        .map_err(agent_store::Error::from)?;
        *self.pending_flush.lock().await = Vec::new();
        *self.active.write().await = None;
        Ok(())
    }
}
