//! # Transfer Repository
//!
//! The `counterpart` column of the list queries is the username on the other
//! side of the transfer: the receiver for `list_from`, the sender for
//! `list_to`.

use chrono::Utc;
use merch_core::{Transfer, TransferEntry};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::DbResult;

/// Records a transfer.
pub async fn insert(
    conn: &mut PgConnection,
    from_user_id: Uuid,
    to_user_id: Uuid,
    amount: i64,
) -> DbResult<Transfer> {
    let transfer = sqlx::query_as(
        r#"
        INSERT INTO transfers (id, from_user_id, to_user_id, amount, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, from_user_id, to_user_id, amount, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(from_user_id)
    .bind(to_user_id)
    .bind(amount)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    Ok(transfer)
}

/// Transfers sent by a user, newest first.
pub async fn list_from(conn: &mut PgConnection, user_id: Uuid) -> DbResult<Vec<TransferEntry>> {
    let entries = sqlx::query_as(
        r#"
        SELECT t.id, t.from_user_id, t.to_user_id, u.username AS counterpart, t.amount, t.created_at
        FROM transfers t
        INNER JOIN users u ON u.id = t.to_user_id
        WHERE t.from_user_id = $1
        ORDER BY t.created_at DESC, t.id
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(entries)
}

/// Transfers received by a user, newest first.
pub async fn list_to(conn: &mut PgConnection, user_id: Uuid) -> DbResult<Vec<TransferEntry>> {
    let entries = sqlx::query_as(
        r#"
        SELECT t.id, t.from_user_id, t.to_user_id, u.username AS counterpart, t.amount, t.created_at
        FROM transfers t
        INNER JOIN users u ON u.id = t.from_user_id
        WHERE t.to_user_id = $1
        ORDER BY t.created_at DESC, t.id
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(entries)
}
