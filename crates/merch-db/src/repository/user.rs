//! # User Repository
//!
//! Account rows and the locked balance read that every debit and credit
//! goes through.
//!
//! ## Locked Read
//! ```text
//! Tx A: SELECT balance ... FOR UPDATE   ──► holds row lock
//! Tx B: SELECT balance ... FOR UPDATE   ──► blocks until A ends
//! Tx A: UPDATE users SET balance = ...  ──► COMMIT, lock released
//! Tx B: reads A's committed balance (or 40001 under SERIALIZABLE)
//! ```

use chrono::Utc;
use merch_core::User;
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

const USER_COLUMNS: &str = "id, username, password_hash, balance, created_at";

/// Reads a balance and locks the row until the transaction ends.
pub async fn lock_balance(conn: &mut PgConnection, user_id: Uuid) -> DbResult<i64> {
    let balance: Option<i64> =
        sqlx::query_scalar("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;

    balance.ok_or_else(|| DbError::not_found("User", user_id))
}

/// Overwrites a balance and returns the updated row.
///
/// Callers validate the value first; the `balance >= 0` CHECK is the last
/// line, surfacing as `CheckViolation`.
pub async fn set_balance(conn: &mut PgConnection, user_id: Uuid, balance: i64) -> DbResult<User> {
    let sql = format!("UPDATE users SET balance = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");

    let user: Option<User> = sqlx::query_as(&sql)
        .bind(user_id)
        .bind(balance)
        .fetch_optional(&mut *conn)
        .await?;

    user.ok_or_else(|| DbError::not_found("User", user_id))
}

/// Gets a user by ID.
pub async fn find_by_id(conn: &mut PgConnection, user_id: Uuid) -> DbResult<User> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

    let user: Option<User> = sqlx::query_as(&sql)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    user.ok_or_else(|| DbError::not_found("User", user_id))
}

/// Gets a user by exact username.
pub async fn find_by_username(conn: &mut PgConnection, username: &str) -> DbResult<User> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");

    let user: Option<User> = sqlx::query_as(&sql)
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;

    user.ok_or_else(|| DbError::not_found("User", username))
}

/// Inserts a new account.
///
/// ## Errors
/// * `UniqueViolation { field: "username" }` - the name is taken
pub async fn insert(
    conn: &mut PgConnection,
    username: &str,
    password_hash: &str,
    balance: i64,
) -> DbResult<User> {
    let id = Uuid::new_v4();

    debug!(user_id = %id, username, balance, "Inserting user");

    let sql = format!(
        "INSERT INTO users (id, username, password_hash, balance, created_at) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
    );

    sqlx::query_as(&sql)
        .bind(id)
        .bind(username)
        .bind(password_hash)
        .bind(balance)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("username", username),
            other => other,
        })
}
