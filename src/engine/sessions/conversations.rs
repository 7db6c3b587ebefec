use super::{now_rfc3339, SessionStore};
use crate::atoms::error::EngineResult;
use crate::atoms::traits::ConversationStore;
use crate::engine::types::*;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

#[async_trait]
impl ConversationStore for SessionStore {
    /// Unknown ids load as an empty conversation.
    async fn load(&self, conversation_id: &str) -> EngineResult<StoredConversation> {
        let conn = self.conn.lock();
        let row: Option<(String, bool)> = conn
            .query_row(
                "SELECT turns, always_allow FROM conversations WHERE id = ?1",
                params![conversation_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((turns, always_allow)) => StoredConversation {
                turns: serde_json::from_str(&turns).unwrap_or_default(),
                always_allow,
            },
            None => StoredConversation::default(),
        })
    }

    async fn save(&self, conversation_id: &str, conversation: &StoredConversation) -> EngineResult<()> {
        let turns = serde_json::to_string(&conversation.turns)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversations (id, turns, always_allow, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                turns = excluded.turns, always_allow = excluded.always_allow, updated_at = excluded.updated_at",
            params![conversation_id, turns, conversation.always_allow, now_rfc3339()],
        )?;
        Ok(())
    }
}
