//! # Product Repository
//!
//! Catalog reads and the seed-time upsert. Titles are unique and matched
//! case-insensitively through the `lower(title)` index.

use merch_core::Product;
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Finds a product by title, ignoring case.
pub async fn find_by_title(conn: &mut PgConnection, title: &str) -> DbResult<Product> {
    let product: Option<Product> =
        sqlx::query_as("SELECT id, title, price FROM products WHERE lower(title) = lower($1)")
            .bind(title)
            .fetch_optional(&mut *conn)
            .await?;

    product.ok_or_else(|| DbError::not_found("Product", title))
}

/// Lists the catalog ordered by title.
pub async fn list(conn: &mut PgConnection) -> DbResult<Vec<Product>> {
    let products: Vec<Product> =
        sqlx::query_as("SELECT id, title, price FROM products ORDER BY lower(title)")
            .fetch_all(&mut *conn)
            .await?;

    Ok(products)
}

/// Inserts a product, or updates the price when the title already exists.
pub async fn upsert(conn: &mut PgConnection, title: &str, price: i64) -> DbResult<Product> {
    debug!(title, price, "Upserting product");

    let product = sqlx::query_as(
        r#"
        INSERT INTO products (id, title, price)
        VALUES ($1, $2, $3)
        ON CONFLICT ((lower(title))) DO UPDATE SET price = EXCLUDED.price
        RETURNING id, title, price
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(title)
    .bind(price)
    .fetch_one(&mut *conn)
    .await?;

    Ok(product)
}
