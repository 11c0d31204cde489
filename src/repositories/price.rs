use crate::models::products::{Product, ProductPrice};

use sqlx::PgPool;

use super::RepositoryError;

#[derive(Clone)]
pub struct PriceRepository {
    conn: PgPool,
}

impl PriceRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    /// Latest `limit` snapshots for a product, oldest first.
    pub async fn recent_prices(
        &self,
        product_id: &str,
        limit: i64,
    ) -> Result<Vec<ProductPrice>, RepositoryError> {
        let mut prices = sqlx::query_as::<_, ProductPrice>(
            "SELECT * FROM product_prices WHERE product_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        prices.reverse();
        Ok(prices)
    }

    pub async fn record_price(
        &self,
        product_id: &str,
        price_in_cents: i64,
    ) -> Result<ProductPrice, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let snapshot = sqlx::query_as::<_, ProductPrice>(
            "INSERT INTO product_prices (product_id, price_in_cents) VALUES ($1, $2) RETURNING *",
        )
        .bind(product_id)
        .bind(price_in_cents)
        .fetch_one(&mut *tx)
        .await?;

        let updated = sqlx::query(
            "UPDATE products SET price_in_cents = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
        )
        .bind(price_in_cents)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("product {}", product_id)));
        }

        tx.commit().await?;

        Ok(snapshot)
    }

    /// Products whose price should be simulated: those held by a user running
    /// the mining bot, or every product when `all` is set.
    pub async fn simulation_candidates(&self, all: bool) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(
            r#"
                SELECT p.* FROM products p
                WHERE $1 OR EXISTS (
                    SELECT 1 FROM user_products up
                    JOIN users u ON u.id = up.user_id
                    WHERE up.product_id = p.id AND u.mining_bot
                )
                ORDER BY p.id
            "#,
        )
        .bind(all)
        .fetch_all(&self.conn)
        .await?;

        Ok(products)
    }
}
