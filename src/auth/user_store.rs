//! Local User & Key Storage
//! Mission: SQLite-backed users and API keys for local development

use crate::auth::models::{ApiKeyRecord, UserRecord};
use crate::auth::store::{ApiKeyStore, UserStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

/// User and API key storage with SQLite backend
pub struct SqliteStore {
    db_path: String,
}

impl SqliteStore {
    /// Create a new store and initialize the database
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open store at {}", self.db_path))
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                key_hash TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_used TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                rate_limit INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )",
            [],
        )?;

        Ok(())
    }

    /// Insert or replace a local user (the provider owns sign-up; this mirrors it)
    pub fn upsert_user(&self, user: &UserRecord) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO users (id, email, is_admin, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                is_admin = excluded.is_admin,
                is_active = excluded.is_active",
            params![
                user.id.to_string(),
                user.email,
                user.is_admin,
                user.is_active,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to upsert user")?;

        info!("Stored user {} (active: {})", user.id, user.is_active);
        Ok(())
    }

    /// Make sure each provider subject id has an active local user.
    ///
    /// Existing rows are left untouched. The email is left blank so the
    /// provider's address is used. Returns how many users were created.
    pub fn seed_users(&self, ids: &[Uuid]) -> Result<usize> {
        let mut created = 0;
        for id in ids {
            if self.get_user(id)?.is_some() {
                continue;
            }
            self.upsert_user(&UserRecord {
                id: *id,
                email: String::new(),
                is_admin: false,
                is_active: true,
            })?;
            created += 1;
        }
        Ok(created)
    }

    pub fn get_user(&self, id: &Uuid) -> Result<Option<UserRecord>> {
        let conn = self.open()?;
        let user = conn
            .query_row(
                "SELECT id, email, is_admin, is_active FROM users WHERE id = ?1",
                params![id.to_string()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let conn = self.open()?;
        let key = conn
            .query_row(
                "SELECT id, user_id, key_hash, name, created_at, last_used, is_active, rate_limit
                 FROM api_keys WHERE key_hash = ?1",
                params![key_hash],
                key_from_row,
            )
            .optional()?;
        Ok(key)
    }

    pub fn create_key(&self, key: &ApiKeyRecord) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO api_keys (id, user_id, key_hash, name, created_at, last_used, is_active, rate_limit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                key.id.to_string(),
                key.user_id.to_string(),
                key.key_hash,
                key.name,
                key.created_at.to_rfc3339(),
                key.last_used.map(|t| t.to_rfc3339()),
                key.is_active,
                key.rate_limit,
            ],
        )
        .context("Failed to insert API key")?;

        info!("Created API key {} for user {}", key.id, key.user_id);
        Ok(())
    }

    pub fn touch_key(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        let conn = self.open()?;
        let rows_affected = conn.execute(
            "UPDATE api_keys SET last_used = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id.to_string()],
        )?;

        if rows_affected == 0 {
            anyhow::bail!("API key not found");
        }
        Ok(())
    }

    #[cfg(test)]
    fn deactivate_key(&self, id: &Uuid) -> Result<()> {
        let conn = self.open()?;
        let rows_affected = conn.execute(
            "UPDATE api_keys SET is_active = 0 WHERE id = ?1",
            params![id.to_string()],
        )?;

        if rows_affected == 0 {
            anyhow::bail!("API key not found");
        }

        info!("Deactivated API key {}", id);
        Ok(())
    }
}

fn parse_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    })
    .transpose()
}

fn user_from_row(row: &Row) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: parse_uuid(row, 0)?,
        email: row.get(1)?,
        is_admin: row.get(2)?,
        is_active: row.get(3)?,
    })
}

fn key_from_row(row: &Row) -> rusqlite::Result<ApiKeyRecord> {
    Ok(ApiKeyRecord {
        id: parse_uuid(row, 0)?,
        user_id: parse_uuid(row, 1)?,
        key_hash: row.get(2)?,
        name: row.get(3)?,
        created_at: parse_timestamp(row, 4)?.unwrap_or_else(Utc::now),
        last_used: parse_timestamp(row, 5)?,
        is_active: row.get(6)?,
        rate_limit: row.get(7)?,
    })
}

#[async_trait::async_trait]
impl UserStore for SqliteStore {
    async fn find_user_by_subject_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        self.get_user(&id)
    }
}

#[async_trait::async_trait]
impl ApiKeyStore for SqliteStore {
    async fn find_key_by_digest(&self, digest: &str) -> Result<Option<ApiKeyRecord>> {
        self.get_key_by_hash(digest)
    }

    async fn update_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.touch_key(&id, at)
    }

    async fn insert_key(&self, record: &ApiKeyRecord) -> Result<()> {
        self.create_key(record)
    }
}
