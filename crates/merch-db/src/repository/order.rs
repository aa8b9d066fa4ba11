//! # Order Repository

use chrono::Utc;
use merch_core::{Order, OrderLine};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::DbResult;

/// Records a purchase.
pub async fn insert(conn: &mut PgConnection, user_id: Uuid, product_id: Uuid) -> DbResult<Order> {
    let order = sqlx::query_as(
        r#"
        INSERT INTO orders (id, user_id, product_id, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, product_id, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(product_id)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    Ok(order)
}

/// Orders placed by a user joined with their product, newest first.
pub async fn list_for_user(conn: &mut PgConnection, user_id: Uuid) -> DbResult<Vec<OrderLine>> {
    let lines = sqlx::query_as(
        r#"
        SELECT
            o.id,
            o.user_id,
            o.product_id,
            p.title AS product_title,
            p.price AS product_price,
            o.created_at
        FROM orders o
        INNER JOIN products p ON p.id = o.product_id
        WHERE o.user_id = $1
        ORDER BY o.created_at DESC, o.id
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(lines)
}
