//! Persisted grant storage.
//!
//! One row per grant in `persisted_grants`, keyed by the hashed handle.

use async_trait::async_trait;
use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;
use time::OffsetDateTime;
use tollgate_auth::AuthResult;
use tollgate_auth::storage::PersistedGrantStore;
use tollgate_auth::types::{PersistedGrant, PersistedGrantType};

use crate::{PgPool, StorageError, StorageResult};

type GrantTuple = (
    String,
    String,
    String,
    Option<String>,
    OffsetDateTime,
    OffsetDateTime,
    Option<OffsetDateTime>,
    String,
);

const SELECT_COLUMNS: &str = "key, grant_type, client_id, subject_id, creation_time, expiration, consumed_time, data";

fn from_tuple(row: GrantTuple) -> StorageResult<PersistedGrant> {
    let grant_type = PersistedGrantType::parse(&row.1)
        .ok_or_else(|| StorageError::invalid_row(format!("unknown grant type '{}'", row.1)))?;
    Ok(PersistedGrant {
        key: row.0,
        grant_type,
        client_id: row.2,
        subject_id: row.3,
        creation_time: row.4,
        expiration: row.5,
        consumed_time: row.6,
        data: row.7,
    })
}

fn map_insert_error(e: sqlx_core::Error, key: &str) -> StorageError {
    if let sqlx_core::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StorageError::conflict(format!("grant '{key}' already exists"));
        }
    }
    StorageError::from(e)
}

/// Inserts one grant row on a pool or inside a transaction.
async fn insert_row<'c, E>(executor: E, grant: &PersistedGrant) -> StorageResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    query(
        r#"
        INSERT INTO persisted_grants
            (key, grant_type, client_id, subject_id, creation_time, expiration, consumed_time, data)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&grant.key)
    .bind(grant.grant_type.as_str())
    .bind(&grant.client_id)
    .bind(&grant.subject_id)
    .bind(grant.creation_time)
    .bind(grant.expiration)
    .bind(grant.consumed_time)
    .bind(&grant.data)
    .execute(executor)
    .await
    .map_err(|e| map_insert_error(e, &grant.key))?;
    Ok(())
}

/// Sets `consumed_time` unless the grant is already consumed.
async fn consume_row<'c, E>(executor: E, key: &str, at: OffsetDateTime) -> StorageResult<bool>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = query(
        r#"
        UPDATE persisted_grants
        SET consumed_time = $2
        WHERE key = $1
          AND consumed_time IS NULL
        "#,
    )
    .bind(key)
    .bind(at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Grant Store
// =============================================================================

/// PostgreSQL implementation of [`PersistedGrantStore`].
#[derive(Debug, Clone)]
pub struct PostgresGrantStore {
    pool: PgPool,
}

impl PostgresGrantStore {
    /// Create a store on an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a store by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new()
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `persisted_grants` table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        crate::migrations::run(&self.pool).await
    }

    async fn insert(&self, grant: &PersistedGrant) -> StorageResult<()> {
        insert_row(&self.pool, grant).await
    }

    async fn find(&self, key: &str) -> StorageResult<Option<PersistedGrant>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM persisted_grants WHERE key = $1");
        let row: Option<GrantTuple> = query_as(&sql).bind(key).fetch_optional(&self.pool).await?;
        row.map(from_tuple).transpose()
    }

    async fn mark_consumed(&self, key: &str, at: OffsetDateTime) -> StorageResult<bool> {
        consume_row(&self.pool, key, at).await
    }

    async fn rotate_in_transaction(
        &self,
        old_key: &str,
        at: OffsetDateTime,
        replacement: &PersistedGrant,
    ) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;

        if !consume_row(&mut *tx, old_key, at).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_row(&mut *tx, replacement).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn update_expiration(&self, key: &str, expiration: OffsetDateTime) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE persisted_grants
            SET expiration = $2
            WHERE key = $1
              AND consumed_time IS NULL
            "#,
        )
        .bind(key)
        .bind(expiration)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        query("DELETE FROM persisted_grants WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_family(&self, subject_id: &str, client_id: &str) -> StorageResult<u64> {
        let result = query("DELETE FROM persisted_grants WHERE subject_id = $1 AND client_id = $2")
            .bind(subject_id)
            .bind(client_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let result = query("DELETE FROM persisted_grants WHERE expiration <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PersistedGrantStore for PostgresGrantStore {
    async fn create(&self, grant: &PersistedGrant) -> AuthResult<String> {
        self.insert(grant).await?;
        tracing::debug!(grant_type = %grant.grant_type, client_id = %grant.client_id, "Grant stored");
        Ok(grant.key.clone())
    }

    async fn get(&self, key: &str) -> AuthResult<Option<PersistedGrant>> {
        Ok(self.find(key).await?)
    }

    async fn consume(&self, key: &str, at: OffsetDateTime) -> AuthResult<bool> {
        Ok(self.mark_consumed(key, at).await?)
    }

    async fn rotate(
        &self,
        old_key: &str,
        at: OffsetDateTime,
        replacement: &PersistedGrant,
    ) -> AuthResult<bool> {
        Ok(self.rotate_in_transaction(old_key, at, replacement).await?)
    }

    async fn slide(&self, key: &str, expiration: OffsetDateTime) -> AuthResult<bool> {
        Ok(self.update_expiration(key, expiration).await?)
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        Ok(self.delete(key).await?)
    }

    async fn remove_all(&self, subject_id: &str, client_id: &str) -> AuthResult<u64> {
        let removed = self.delete_family(subject_id, client_id).await?;
        tracing::debug!(client_id = %client_id, removed, "Grant family removed");
        Ok(removed)
    }

    async fn remove_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        Ok(self.delete_expired(now).await?)
    }
}
