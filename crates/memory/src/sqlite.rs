//! SQLite history backend.
//!
//! Uses a single SQLite database file with three tables:
//! - `sessions`: session id and owning identity
//! - `messages`: raw messages keyed by `(session_id, seq)`; `seq` is the
//!   message's index in the session's raw index space
//! - `summaries`: append-only summary records, key data stored as JSON

use async_trait::async_trait;
use chrono::Utc;
use parley_core::error::HistoryError;
use parley_core::history::{HistoryStore, SummaryRecord};
use parley_core::message::{Message, Role};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A SQLite-backed history store.
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Open (or create) a database at `path`.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an ephemeral database (single connection).
    pub async fn open(path: &str) -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| HistoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to ":memory:" is its own database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite history initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, HistoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations: creates tables and indexes.
    async fn run_migrations(&self) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id          TEXT PRIMARY KEY,
                owner       TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                session_id    TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                seq           INTEGER NOT NULL,
                role          TEXT NOT NULL,
                content       TEXT NOT NULL,
                role_context  TEXT,
                metadata      TEXT NOT NULL DEFAULT '{}',
                created_at    TEXT NOT NULL,
                PRIMARY KEY (session_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summaries (
                id            TEXT PRIMARY KEY,
                session_id    TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                index_start   INTEGER NOT NULL,
                index_end     INTEGER NOT NULL,
                content       TEXT NOT NULL,
                key_data      TEXT NOT NULL DEFAULT '[]',
                created_at    TEXT NOT NULL,
                CHECK (index_start <= index_end)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("summaries table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_summaries_session ON summaries(session_id, index_start)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("summaries index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn ensure_session(&self, session_id: &str) -> Result<(), HistoryError> {
        let exists = sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("session lookup: {e}")))?;
        match exists {
            Some(_) => Ok(()),
            None => Err(HistoryError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Parse a `Message` from a SQLite row.
    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, HistoryError> {
        let role: String = row
            .try_get("role")
            .map_err(|e| HistoryError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| HistoryError::QueryFailed(format!("content column: {e}")))?;
        let role_context: Option<String> = row
            .try_get("role_context")
            .map_err(|e| HistoryError::QueryFailed(format!("role_context column: {e}")))?;
        let metadata_json: String = row
            .try_get("metadata")
            .map_err(|e| HistoryError::QueryFailed(format!("metadata column: {e}")))?;

        Ok(Message {
            role: Role::parse(&role),
            content,
            role_context,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        })
    }

    /// Parse a `SummaryRecord` from a SQLite row.
    fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<SummaryRecord, HistoryError> {
        let column = |name: &str, e: sqlx::Error| HistoryError::QueryFailed(format!("{name} column: {e}"));

        let index_start: i64 = row.try_get("index_start").map_err(|e| column("index_start", e))?;
        let index_end: i64 = row.try_get("index_end").map_err(|e| column("index_end", e))?;
        let key_data_json: String = row.try_get("key_data").map_err(|e| column("key_data", e))?;
        let created_at_str: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;

        Ok(SummaryRecord {
            id: row.try_get("id").map_err(|e| column("id", e))?,
            session_id: row.try_get("session_id").map_err(|e| column("session_id", e))?,
            index_start: index_start.max(0) as usize,
            index_end: index_end.max(0) as usize,
            content: row.try_get("content").map_err(|e| column("content", e))?,
            key_data: serde_json::from_str(&key_data_json).unwrap_or_default(),
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_session(&self, owner: &str) -> Result<String, HistoryError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO sessions (id, owner, created_at) VALUES (?1, ?2, ?3)")
            .bind(&id)
            .bind(owner)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| HistoryError::Storage(format!("INSERT session failed: {e}")))?;
        debug!("Created session {id}");
        Ok(id)
    }

    async fn session_owner(&self, session_id: &str) -> Result<Option<String>, HistoryError> {
        let row = sqlx::query("SELECT owner FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("owner lookup: {e}")))?;
        row.map(|r| {
            r.try_get::<String, _>("owner")
                .map_err(|e| HistoryError::QueryFailed(format!("owner column: {e}")))
        })
        .transpose()
    }

    async fn append_message(&self, session_id: &str, message: Message) -> Result<(), HistoryError> {
        self.ensure_session(session_id).await?;
        let metadata = serde_json::to_string(&message.metadata)
            .map_err(|e| HistoryError::Storage(format!("Metadata serialization: {e}")))?;

        // A single statement, so the sequence number is assigned atomically.
        sqlx::query(
            r#"
            INSERT INTO messages (session_id, seq, role, content, role_context, metadata, created_at)
            VALUES (
                ?1,
                (SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE session_id = ?1),
                ?2, ?3, ?4, ?5, ?6
            )
            "#,
        )
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.role_context)
        .bind(&metadata)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::Storage(format!("INSERT message failed: {e}")))?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        last_n: usize,
    ) -> Result<Vec<Message>, HistoryError> {
        self.ensure_session(session_id).await?;
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM messages WHERE session_id = ?1 ORDER BY seq DESC LIMIT ?2
            ) ORDER BY seq ASC
            "#,
        )
        .bind(session_id)
        .bind(last_n.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistoryError::QueryFailed(format!("recent messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn all_messages(&self, session_id: &str) -> Result<Vec<Message>, HistoryError> {
        self.ensure_session(session_id).await?;
        let rows = sqlx::query("SELECT * FROM messages WHERE session_id = ?1 ORDER BY seq ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("all messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn summaries(&self, session_id: &str) -> Result<Vec<SummaryRecord>, HistoryError> {
        self.ensure_session(session_id).await?;
        let rows = sqlx::query(
            "SELECT * FROM summaries WHERE session_id = ?1 ORDER BY index_start ASC, created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistoryError::QueryFailed(format!("summaries: {e}")))?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn store_summary(&self, mut record: SummaryRecord) -> Result<String, HistoryError> {
        if record.index_start > record.index_end {
            return Err(HistoryError::Storage(format!(
                "summary interval [{}, {}] is inverted",
                record.index_start, record.index_end
            )));
        }
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        self.ensure_session(&record.session_id).await?;

        let key_data = serde_json::to_string(&record.key_data)
            .map_err(|e| HistoryError::Storage(format!("Key data serialization: {e}")))?;

        // Plain INSERT: summaries are never rewritten.
        sqlx::query(
            r#"
            INSERT INTO summaries (id, session_id, index_start, index_end, content, key_data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&record.id)
        .bind(&record.session_id)
        .bind(record.index_start as i64)
        .bind(record.index_end as i64)
        .bind(&record.content)
        .bind(&key_data)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::Storage(format!("INSERT summary failed: {e}")))?;

        debug!(
            session_id = %record.session_id,
            index_start = record.index_start,
            index_end = record.index_end,
            "Stored summary {}",
            record.id
        );
        Ok(record.id)
    }
}
