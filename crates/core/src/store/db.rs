//! # Quorum Database
//!
//! Single SQLite database for conversations and messages. Stage payloads
//! land in nullable JSON columns on the message row; each is written
//! exactly once, keyed by (conversation id, message id), as the owning
//! turn progresses. Deleting a conversation cascades to its messages.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::council::types::{RankingMetadata, ReviewerRanking, StageAnswer};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Placeholder title until title generation completes
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => bail!("unknown message role '{other}'"),
        }
    }
}

/// A stored message.
///
/// User messages carry `content`; assistant messages carry the stage
/// payloads, each absent until the corresponding stage completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage1: Option<Vec<StageAnswer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage2: Option<Vec<ReviewerRanking>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage3: Option<StageAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RankingMetadata>,
    pub created_at: String,
}

/// Conversation metadata for list views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub id: String,
    pub created_at: String,
    pub title: String,
    pub message_count: i64,
}

/// Full conversation with all messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub created_at: String,
    pub title: String,
    pub messages: Vec<Message>,
}

/// Database manager for all Quorum state
pub struct QuorumDb {
    conn: Arc<Mutex<Connection>>,
}

impl QuorumDb {
    /// Open or create the database at `.quorum/quorum.db`
    pub fn open() -> Result<Self> {
        Self::open_at(".quorum/quorum.db")
    }

    /// Open database at a specific path (useful for testing)
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path.as_ref()).context("Failed to open quorum database")?;
        // Cascade deletes depend on this pragma; it is per-connection.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// Run schema migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [1],
            )?;
        }

        Ok(())
    }

    /// Migration to version 1 - complete schema
    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                title TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL
                    REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT,
                stage1_json TEXT,
                stage2_json TEXT,
                stage3_json TEXT,
                metadata_json TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
             ON messages(conversation_id)",
            [],
        )?;

        tracing::info!("QuorumDb initialized with schema version {}", SCHEMA_VERSION);

        Ok(())
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Create a new conversation with a placeholder title
    pub fn create_conversation(&self) -> Result<Conversation> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO conversations (id, created_at, title) VALUES (?1, ?2, ?3)",
            params![id, created_at, DEFAULT_TITLE],
        )?;

        Ok(Conversation {
            id,
            created_at,
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
        })
    }

    /// List all conversations (metadata only), newest first
    pub fn list_conversations(&self) -> Result<Vec<ConversationMeta>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.created_at, c.title, COUNT(m.id)
            FROM conversations c
            LEFT JOIN messages m ON c.id = m.conversation_id
            GROUP BY c.id
            ORDER BY c.created_at DESC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ConversationMeta {
                id: row.get(0)?,
                created_at: row.get(1)?,
                title: row.get(2)?,
                message_count: row.get(3)?,
            })
        })?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    /// Load a conversation with all its messages, or `None` if unknown
    pub fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let conn = self.lock()?;

        let head = conn
            .query_row(
                "SELECT id, created_at, title FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, created_at, title)) = head else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT id, role, content, stage1_json, stage2_json,
                   stage3_json, metadata_json, created_at
            FROM messages
            WHERE conversation_id = ?1
            ORDER BY rowid ASC
            "#,
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (msg_id, role, content, s1, s2, s3, meta, msg_created) = row?;
            messages.push(Message {
                id: msg_id,
                conversation_id: conversation_id.to_string(),
                role: MessageRole::parse(&role)?,
                content,
                stage1: parse_json(s1.as_deref(), "stage1_json")?,
                stage2: parse_json(s2.as_deref(), "stage2_json")?,
                stage3: parse_json(s3.as_deref(), "stage3_json")?,
                metadata: parse_json(meta.as_deref(), "metadata_json")?,
                created_at: msg_created,
            });
        }

        Ok(Some(Conversation {
            id,
            created_at,
            title,
            messages,
        }))
    }

    /// Delete a conversation and (by cascade) all its messages.
    /// Returns false if the conversation did not exist.
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![conversation_id],
        )?;
        Ok(deleted > 0)
    }

    /// Update the title of a conversation
    pub fn update_title(&self, conversation_id: &str, title: &str) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE conversations SET title = ?1 WHERE id = ?2",
            params![title, conversation_id],
        )?;
        if updated == 0 {
            bail!("Conversation {conversation_id} not found");
        }
        Ok(())
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Append a user message and return its id
    pub fn add_user_message(&self, conversation_id: &str, content: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        let conn = self.lock()?;
        self.assert_conversation(&conn, conversation_id)?;
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, 'user', ?3, ?4)",
            params![id, conversation_id, content, created_at],
        )?;
        Ok(id)
    }

    /// Append an assistant message with empty stage payloads and return its
    /// id. Called at fan-out start; the pipeline fills the payloads in as
    /// stages complete.
    pub fn add_assistant_message(&self, conversation_id: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        let conn = self.lock()?;
        self.assert_conversation(&conn, conversation_id)?;
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, created_at)
             VALUES (?1, ?2, 'assistant', ?3)",
            params![id, conversation_id, created_at],
        )?;
        Ok(id)
    }

    /// Persist the stage-1 payload for an assistant message
    pub fn set_stage1(
        &self,
        conversation_id: &str,
        message_id: &str,
        data: &[StageAnswer],
    ) -> Result<()> {
        self.set_stage_column(conversation_id, message_id, "stage1_json", json(data)?)
    }

    /// Persist the stage-2 payload for an assistant message
    pub fn set_stage2(
        &self,
        conversation_id: &str,
        message_id: &str,
        data: &[ReviewerRanking],
    ) -> Result<()> {
        self.set_stage_column(conversation_id, message_id, "stage2_json", json(data)?)
    }

    /// Persist the stage-3 payload for an assistant message
    pub fn set_stage3(
        &self,
        conversation_id: &str,
        message_id: &str,
        data: &StageAnswer,
    ) -> Result<()> {
        self.set_stage_column(conversation_id, message_id, "stage3_json", json(data)?)
    }

    /// Persist the audit metadata for an assistant message
    pub fn set_metadata(
        &self,
        conversation_id: &str,
        message_id: &str,
        data: &RankingMetadata,
    ) -> Result<()> {
        self.set_stage_column(conversation_id, message_id, "metadata_json", json(data)?)
    }

    /// Write one stage column, keyed by (conversation, message), only if it
    /// is still NULL. A second write to the same column is a bug in the
    /// caller and surfaces as an error rather than silently overwriting.
    fn set_stage_column(
        &self,
        conversation_id: &str,
        message_id: &str,
        column: &str,
        value: String,
    ) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            &format!(
                "UPDATE messages SET {column} = ?1
                 WHERE id = ?2 AND conversation_id = ?3 AND {column} IS NULL"
            ),
            params![value, message_id, conversation_id],
        )?;
        if updated == 0 {
            bail!("{column} already set or message {message_id} not found");
        }
        Ok(())
    }

    fn assert_conversation(&self, conn: &Connection, conversation_id: &str) -> Result<()> {
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            bail!("Conversation {conversation_id} not found");
        }
        Ok(())
    }
}

fn json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize stage payload")
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: Option<&str>, column: &str) -> Result<Option<T>> {
    match raw {
        None => Ok(None),
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .with_context(|| format!("Corrupt {column} payload")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::types::LabelScore;
    use std::collections::BTreeMap;
    use std::fs;

    fn open(name: &str) -> (QuorumDb, String) {
        let path = format!(".quorum/test_{name}.db");
        let _ = fs::remove_file(&path);
        (QuorumDb::open_at(&path).unwrap(), path)
    }

    #[test]
    fn test_create_and_list_conversations() {
        let (db, path) = open("create_list");

        let conversation = db.create_conversation().unwrap();
        assert_eq!(conversation.title, DEFAULT_TITLE);

        let listed = db.list_conversations().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, conversation.id);
        assert_eq!(listed[0].message_count, 0);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_message_lifecycle_and_hydration() {
        let (db, path) = open("lifecycle");
        let conversation = db.create_conversation().unwrap();

        db.add_user_message(&conversation.id, "what is a B-tree?")
            .unwrap();
        let message_id = db.add_assistant_message(&conversation.id).unwrap();

        let stage1 = vec![StageAnswer::new("m1", "a balanced tree")];
        db.set_stage1(&conversation.id, &message_id, &stage1)
            .unwrap();

        let loaded = db.get_conversation(&conversation.id).unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].role, MessageRole::User);
        assert_eq!(
            loaded.messages[0].content.as_deref(),
            Some("what is a B-tree?")
        );
        assert_eq!(loaded.messages[1].role, MessageRole::Assistant);
        assert_eq!(loaded.messages[1].stage1.as_ref().unwrap(), &stage1);
        assert!(loaded.messages[1].stage2.is_none());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_stage_payload_is_set_once() {
        let (db, path) = open("set_once");
        let conversation = db.create_conversation().unwrap();
        let message_id = db.add_assistant_message(&conversation.id).unwrap();

        let stage3 = StageAnswer::new("m1", "final");
        db.set_stage3(&conversation.id, &message_id, &stage3)
            .unwrap();

        // Second write must fail, first payload must survive
        let overwrite = StageAnswer::new("m2", "rewritten");
        assert!(db
            .set_stage3(&conversation.id, &message_id, &overwrite)
            .is_err());

        let loaded = db.get_conversation(&conversation.id).unwrap().unwrap();
        assert_eq!(loaded.messages[0].stage3.as_ref().unwrap(), &stage3);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_payload_round_trip_matches_event_objects() {
        let (db, path) = open("round_trip");
        let conversation = db.create_conversation().unwrap();
        let message_id = db.add_assistant_message(&conversation.id).unwrap();

        let stage2 = vec![ReviewerRanking {
            reviewer: "m1".into(),
            ranking: vec!["Response B".into(), "Response A".into()],
        }];
        let metadata = RankingMetadata {
            label_to_model: BTreeMap::from([
                ("Response A".to_string(), "m1".to_string()),
                ("Response B".to_string(), "m2".to_string()),
            ]),
            aggregate_rankings: vec![LabelScore {
                label: "Response B".into(),
                model: "m2".into(),
                score: 2,
            }],
        };
        db.set_stage2(&conversation.id, &message_id, &stage2)
            .unwrap();
        db.set_metadata(&conversation.id, &message_id, &metadata)
            .unwrap();

        let loaded = db.get_conversation(&conversation.id).unwrap().unwrap();
        assert_eq!(loaded.messages[0].stage2.as_ref().unwrap(), &stage2);
        assert_eq!(loaded.messages[0].metadata.as_ref().unwrap(), &metadata);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_delete_cascades_to_messages() {
        let (db, path) = open("cascade");
        let conversation = db.create_conversation().unwrap();
        db.add_user_message(&conversation.id, "hello").unwrap();
        db.add_assistant_message(&conversation.id).unwrap();

        assert!(db.delete_conversation(&conversation.id).unwrap());
        assert!(db.get_conversation(&conversation.id).unwrap().is_none());

        // No orphaned messages reference the deleted conversation
        let conn = db.conn.lock().unwrap();
        let orphans: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                params![conversation.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
        drop(conn);

        // Deleting again reports not found
        assert!(!db.delete_conversation(&conversation.id).unwrap());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_title_update() {
        let (db, path) = open("title");
        let conversation = db.create_conversation().unwrap();

        db.update_title(&conversation.id, "B-trees explained")
            .unwrap();
        let loaded = db.get_conversation(&conversation.id).unwrap().unwrap();
        assert_eq!(loaded.title, "B-trees explained");

        assert!(db.update_title("missing", "nope").is_err());

        let _ = fs::remove_file(path);
    }
}
