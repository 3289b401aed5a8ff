use std::{
    path::Path,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    tracing::debug,
};

use chatcast_protocol::ChatMessage;

use crate::store::MessageStore;

/// SQLite-backed message log.
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    email: String,
    username: String,
    message: String,
}

impl From<MessageRow> for ChatMessage {
    fn from(r: MessageRow) -> Self {
        ChatMessage::new(r.email, r.username, r.message)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl SqliteMessageStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    ///
    /// `:memory:` opens a private in-memory database.
    pub async fn connect(path: &str) -> Result<Self> {
        let pool = if path == ":memory:" {
            // Every connection to `sqlite::memory:` is a separate database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .connect_with(options)
                .await
                .with_context(|| format!("failed to open message store at {path}"))?
        };
        Self::init(&pool).await?;
        debug!(path, "message store ready");
        Ok(Self::new(pool))
    }

    /// Wrap a pool whose schema is already initialised.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `messages` table if it doesn't exist.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                email      TEXT NOT NULL,
                username   TEXT NOT NULL,
                message    TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages (created_at DESC)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, message: &ChatMessage) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (email, username, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(message.sender_email())
        .bind(message.username())
        .bind(message.body())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT email, username, message FROM messages
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
