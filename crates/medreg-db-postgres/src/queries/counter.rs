//! Counter row queries.
//!
//! The row for a prefix is created on first use with `last_value = 0`, then
//! locked with `SELECT ... FOR UPDATE`. Concurrent first uses serialize on the
//! primary key, so the lazy insert never produces two rows.

use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgConnection, Postgres};

use medreg_core::Prefix;
use medreg_storage::{StorageError, counter_key};

use crate::error::map_sqlx_error;

/// Creates the row for `prefix` if missing, locks it and returns its value.
pub async fn lock_and_read(conn: &mut PgConnection, prefix: &Prefix) -> Result<i64, StorageError> {
    let key = counter_key(prefix);

    query(
        "INSERT INTO correlative_counter (prefix, last_value) VALUES ($1, 0) \
         ON CONFLICT (prefix) DO NOTHING",
    )
    .bind(prefix.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(e, &key))?;

    query_scalar("SELECT last_value FROM correlative_counter WHERE prefix = $1 FOR UPDATE")
        .bind(prefix.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, &key))
}

/// Moves the counter forward to `value`.
///
/// Returns `StorageError::CounterRegression` when `value` does not exceed the
/// stored value; the row is left untouched in that case.
pub async fn write(conn: &mut PgConnection, prefix: &Prefix, value: i64) -> Result<(), StorageError> {
    let key = counter_key(prefix);

    let result = query(
        "UPDATE correlative_counter SET last_value = $2, updated_at = now() \
         WHERE prefix = $1 AND last_value < $2",
    )
    .bind(prefix.as_str())
    .bind(value)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(e, &key))?;

    if result.rows_affected() == 0 {
        let current = peek(&mut *conn, prefix).await?;
        return Err(StorageError::counter_regression(prefix.as_str(), value, current));
    }
    Ok(())
}

/// Reads the value without locking. Missing rows read as `0`.
pub async fn peek<'e, E>(executor: E, prefix: &Prefix) -> Result<i64, StorageError>
where
    E: Executor<'e, Database = Postgres>,
{
    let value: Option<i64> =
        query_scalar("SELECT last_value FROM correlative_counter WHERE prefix = $1")
            .bind(prefix.as_str())
            .fetch_optional(executor)
            .await
            .map_err(|e| map_sqlx_error(e, &counter_key(prefix)))?;
    Ok(value.unwrap_or(0))
}
