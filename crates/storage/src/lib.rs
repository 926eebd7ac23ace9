use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use shared::protocol::{
    ChangeEntry, ChangeNotice, ChangesResponse, Revision, StoredDocument, MAX_GENERATION,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite, Transaction,
};
use tokio::sync::broadcast;
use tracing::debug;

mod error;
mod registry;

pub use error::StoreError;
pub use registry::{
    validate_database_name, LocalStores, StoreLocation, StoreProvider, MAX_DATABASE_NAME_LEN,
};

const REVISION_DIGEST_LEN: usize = 32;
const CHANGE_NOTICE_CAPACITY: usize = 256;

/// Key/value document store with revision-checked writes and a change log.
///
/// Implemented by the local SQLite [`Storage`] and by remote replicas.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the database this store is scoped to.
    fn name(&self) -> &str;

    async fn get(&self, id: &str) -> Result<StoredDocument, StoreError>;

    /// Writes `payload` under `id`.
    ///
    /// Without `rev` the document must not exist yet (else `Conflict`). With
    /// `rev` the document must exist (else `NotFound`) and `rev` must be its
    /// current revision (else `Conflict`). Returns the newly assigned revision.
    async fn put(
        &self,
        id: &str,
        payload: &serde_json::Value,
        rev: Option<&Revision>,
    ) -> Result<Revision, StoreError>;

    /// Latest change of each document written after `since`, in sequence order.
    async fn changes_since(&self, since: i64) -> Result<ChangesResponse, StoreError>;

    /// Stores a document received from another replica, keeping its revision.
    ///
    /// Applied only when the incoming revision orders after the current one.
    async fn apply_replicated(&self, document: &StoredDocument) -> Result<bool, StoreError>;

    /// Subscribes to change notices for every accepted write.
    async fn watch(&self) -> Result<broadcast::Receiver<ChangeNotice>, StoreError>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    name: String,
    notices: broadcast::Sender<ChangeNotice>,
}

impl Storage {
    pub async fn new(database_url: &str, name: impl Into<String>) -> Result<Self, StoreError> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // An in-memory database lives only as long as its last connection.
        let pool_options = if sqlite_path(database_url).is_none() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        let (notices, _) = broadcast::channel(CHANGE_NOTICE_CAPACITY);
        Ok(Self {
            pool,
            name: name.into(),
            notices,
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        let _: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Sequence number of the most recent accepted write, or 0.
    pub async fn update_seq(&self) -> Result<i64, StoreError> {
        let seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM changes")
            .fetch_one(&self.pool)
            .await?;
        Ok(seq)
    }

    pub async fn document_count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn record_change(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        rev: &Revision,
    ) -> Result<ChangeEntry, StoreError> {
        let row = sqlx::query("INSERT INTO changes (doc_id, rev) VALUES (?, ?) RETURNING seq")
            .bind(id)
            .bind(rev.to_string())
            .fetch_one(&mut **tx)
            .await?;
        let seq = row.get::<i64, _>(0);
        // Only the latest change per document is kept.
        sqlx::query("DELETE FROM changes WHERE doc_id = ? AND seq < ?")
            .bind(id)
            .bind(seq)
            .execute(&mut **tx)
            .await?;
        Ok(ChangeEntry {
            seq,
            id: id.to_string(),
            rev: rev.clone(),
        })
    }

    fn notify(&self, change: ChangeEntry) {
        debug!(db = %self.name, doc_id = %change.id, rev = %change.rev, seq = change.seq, "document changed");
        let _ = self.notices.send(ChangeNotice {
            db: self.name.clone(),
            change,
        });
    }
}

#[async_trait]
impl DocumentStore for Storage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, id: &str) -> Result<StoredDocument, StoreError> {
        let row = sqlx::query("SELECT id, rev, payload, updated_at FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        Ok(StoredDocument {
            id: row.get::<String, _>(0),
            rev: row.get::<String, _>(1).parse()?,
            payload: serde_json::from_str(&row.get::<String, _>(2))?,
            updated_at: row.get::<DateTime<Utc>, _>(3),
        })
    }

    async fn put(
        &self,
        id: &str,
        payload: &serde_json::Value,
        rev: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        let body = serde_json::to_string(payload)?;
        let new_rev = next_revision(rev, &body)?;
        let generation = generation_column(&new_rev)?;
        let mut tx = self.pool.begin().await?;

        match rev {
            None => {
                let inserted = sqlx::query(
                    "INSERT INTO documents (id, rev, generation, payload, updated_at)
                     VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO NOTHING",
                )
                .bind(id)
                .bind(new_rev.to_string())
                .bind(generation)
                .bind(&body)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?
                .rows_affected();
                if inserted == 0 {
                    return Err(StoreError::Conflict { id: id.to_string() });
                }
            }
            Some(expected) => {
                let updated = sqlx::query(
                    "UPDATE documents
                     SET rev = ?, generation = ?, payload = ?, updated_at = ?
                     WHERE id = ? AND rev = ?",
                )
                .bind(new_rev.to_string())
                .bind(generation)
                .bind(&body)
                .bind(Utc::now())
                .bind(id)
                .bind(expected.to_string())
                .execute(&mut *tx)
                .await?
                .rows_affected();
                if updated == 0 {
                    let exists: i64 =
                        sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE id = ?")
                            .bind(id)
                            .fetch_one(&mut *tx)
                            .await?;
                    return Err(if exists > 0 {
                        StoreError::Conflict { id: id.to_string() }
                    } else {
                        StoreError::NotFound { id: id.to_string() }
                    });
                }
            }
        }

        let change = self.record_change(&mut tx, id, &new_rev).await?;
        tx.commit().await?;
        self.notify(change);
        Ok(new_rev)
    }

    async fn changes_since(&self, since: i64) -> Result<ChangesResponse, StoreError> {
        let rows = sqlx::query("SELECT seq, doc_id, rev FROM changes WHERE seq > ? ORDER BY seq ASC")
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(ChangeEntry {
                seq: row.get::<i64, _>(0),
                id: row.get::<String, _>(1),
                rev: row.get::<String, _>(2).parse()?,
            });
        }
        let last_seq = results.last().map(|c| c.seq).unwrap_or(since);
        Ok(ChangesResponse { last_seq, results })
    }

    async fn apply_replicated(&self, document: &StoredDocument) -> Result<bool, StoreError> {
        let body = serde_json::to_string(&document.payload)?;
        let rev = document.rev.to_string();
        let generation = generation_column(&document.rev)?;
        let mut tx = self.pool.begin().await?;

        // Same-generation revisions share their prefix, so comparing the full
        // token text orders them by digest.
        let applied = sqlx::query(
            "INSERT INTO documents (id, rev, generation, payload, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                rev = excluded.rev,
                generation = excluded.generation,
                payload = excluded.payload,
                updated_at = excluded.updated_at
             WHERE excluded.generation > documents.generation
                OR (excluded.generation = documents.generation AND excluded.rev > documents.rev)",
        )
        .bind(&document.id)
        .bind(&rev)
        .bind(generation)
        .bind(&body)
        .bind(document.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !applied {
            return Ok(false);
        }

        let change = self.record_change(&mut tx, &document.id, &document.rev).await?;
        tx.commit().await?;
        self.notify(change);
        Ok(true)
    }

    async fn watch(&self) -> Result<broadcast::Receiver<ChangeNotice>, StoreError> {
        Ok(self.notices.subscribe())
    }
}

/// Next revision after `previous` for a document whose serialized body is `body`.
///
/// Fails once the generation would pass [`MAX_GENERATION`].
pub fn next_revision(previous: Option<&Revision>, body: &str) -> Result<Revision, StoreError> {
    let generation = match previous {
        Some(rev) => rev
            .generation()
            .checked_add(1)
            .filter(|next| *next <= MAX_GENERATION)
            .ok_or_else(|| StoreError::GenerationOverflow(rev.clone()))?,
        None => 1,
    };
    let mut hasher = Sha256::new();
    if let Some(previous) = previous {
        hasher.update(previous.to_string().as_bytes());
    }
    hasher.update(b"\n");
    hasher.update(body.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    Ok(Revision::new(generation, &digest[..REVISION_DIGEST_LEN]))
}

fn generation_column(rev: &Revision) -> Result<i64, StoreError> {
    i64::try_from(rev.generation()).map_err(|_| StoreError::GenerationOverflow(rev.clone()))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<(), StoreError> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent)?;
    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
