use super::types::{InteractionRecord, UserId, UserRecord};
use crate::error::LedgerError;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use std::future::Future;
use std::pin::Pin;

type LedgerResult<T> = Result<T, LedgerError>;

/// Durable per-user quota state plus the interaction audit log.
///
/// Every write is a single SQL statement so concurrent command handlers and
/// the reset scheduler never lose updates.
pub trait Ledger: Send + Sync {
    fn get_user<'a>(
        &'a self,
        id: UserId,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<Option<UserRecord>>> + Send + 'a>>;

    /// Insert with tier 0 and no uses. A duplicate id is logged and the
    /// existing row returned instead.
    fn insert_user<'a>(
        &'a self,
        id: UserId,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<UserRecord>> + Send + 'a>>;

    fn rename_user<'a>(
        &'a self,
        id: UserId,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<()>> + Send + 'a>>;

    fn increment_use<'a>(
        &'a self,
        id: UserId,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<()>> + Send + 'a>>;

    /// Give back a use reserved for a prompt that produced no completion.
    fn refund_use<'a>(
        &'a self,
        id: UserId,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<()>> + Send + 'a>>;

    /// Zero every counter; returns the number of rows touched.
    fn reset_all_uses<'a>(&'a self)
    -> Pin<Box<dyn Future<Output = LedgerResult<u64>> + Send + 'a>>;

    /// Append an audit row. Duplicate ids are logged and dropped.
    fn record_interaction<'a>(
        &'a self,
        entry: &'a InteractionRecord,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<()>> + Send + 'a>>;
}

/// SQLite-backed ledger using sqlx async pool.
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Wrap an existing pool and create the tables if missing.
    pub async fn new(pool: SqlitePool) -> LedgerResult<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS Users (
                 ID INTEGER PRIMARY KEY,
                 Name TEXT NOT NULL,
                 MemberStatus INTEGER NOT NULL DEFAULT 0,
                 NumUses INTEGER NOT NULL DEFAULT 0
             )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS Messages (
                 ID INTEGER PRIMARY KEY,
                 user_id INTEGER NOT NULL,
                 msg TEXT NOT NULL,
                 prompt TEXT NOT NULL,
                 response TEXT NOT NULL,
                 num_context_tokens INTEGER NOT NULL,
                 num_response_tokens INTEGER NOT NULL,
                 timestamp TEXT NOT NULL
             )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() || db.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}

fn token_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn map_user_row(row: &SqliteRow) -> LedgerResult<UserRecord> {
    let id: i64 = row.try_get("ID")?;
    let uses: i64 = row.try_get("NumUses")?;

    Ok(UserRecord {
        id: UserId(
            u64::try_from(id).map_err(|_| LedgerError::Corrupt(format!("negative user id {id}")))?,
        ),
        name: row.try_get("Name")?,
        tier: row.try_get("MemberStatus")?,
        uses: u32::try_from(uses)
            .map_err(|_| LedgerError::Corrupt(format!("user {id} has NumUses {uses}")))?,
    })
}

impl Ledger for SqliteLedger {
    fn get_user<'a>(
        &'a self,
        id: UserId,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<Option<UserRecord>>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT ID, Name, MemberStatus, NumUses
                 FROM Users
                 WHERE ID = $1",
            )
            .bind(id.to_sql()?)
            .fetch_optional(&self.pool)
            .await?;

            row.map(|r| map_user_row(&r)).transpose()
        })
    }

    fn insert_user<'a>(
        &'a self,
        id: UserId,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<UserRecord>> + Send + 'a>> {
        Box::pin(async move {
            let inserted = sqlx::query(
                "INSERT INTO Users (ID, Name, MemberStatus, NumUses) VALUES ($1, $2, 0, 0)",
            )
            .bind(id.to_sql()?)
            .bind(name)
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => {
                    tracing::info!(user_id = %id, name, "user added to ledger");
                }
                Err(e) if is_unique_violation(&e) => {
                    tracing::warn!(
                        user_id = %id,
                        name,
                        "user insert hit an existing row; reusing it"
                    );
                }
                Err(e) => return Err(e.into()),
            }

            self.get_user(id)
                .await?
                .ok_or(LedgerError::MissingUser(id.0))
        })
    }

    fn rename_user<'a>(
        &'a self,
        id: UserId,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<()>> + Send + 'a>> {
        Box::pin(async move {
            sqlx::query("UPDATE Users SET Name = $1 WHERE ID = $2")
                .bind(name)
                .bind(id.to_sql()?)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn increment_use<'a>(
        &'a self,
        id: UserId,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE Users SET NumUses = NumUses + 1 WHERE ID = $1")
                .bind(id.to_sql()?)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(LedgerError::MissingUser(id.0));
            }
            Ok(())
        })
    }

    fn refund_use<'a>(
        &'a self,
        id: UserId,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<()>> + Send + 'a>> {
        Box::pin(async move {
            sqlx::query("UPDATE Users SET NumUses = MAX(NumUses - 1, 0) WHERE ID = $1")
                .bind(id.to_sql()?)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn reset_all_uses<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<u64>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE Users SET NumUses = 0")
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
    }

    fn record_interaction<'a>(
        &'a self,
        entry: &'a InteractionRecord,
    ) -> Pin<Box<dyn Future<Output = LedgerResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let id = i64::try_from(entry.id).map_err(|_| LedgerError::IdOutOfRange(entry.id))?;

            let inserted = sqlx::query(
                "INSERT INTO Messages
                     (ID, user_id, msg, prompt, response, num_context_tokens, num_response_tokens, timestamp)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(id)
            .bind(entry.user_id.to_sql()?)
            .bind(&entry.raw)
            .bind(&entry.prompt)
            .bind(&entry.response)
            .bind(token_count(entry.prompt_tokens))
            .bind(token_count(entry.completion_tokens))
            .bind(entry.formatted_timestamp())
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => {
                    tracing::warn!(
                        interaction_id = entry.id,
                        user_id = %entry.user_id,
                        "interaction already recorded; dropping duplicate"
                    );
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        })
    }
}
