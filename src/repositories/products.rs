use crate::models::products;
use crate::models::transactions::{PaymentMethod, TransactionKind, TransactionStatus};
use crate::utils;

use sqlx::PgPool;

use super::{transactions::adjust_balance, RepositoryError};

#[derive(Clone)]
pub struct ProductRepository {
    conn: PgPool,
}

impl ProductRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn insert_product(
        &self,
        shop_id: &str,
        name: &str,
        slug: &str,
        price_in_cents: i64,
    ) -> Result<products::Product, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let product = sqlx::query_as::<_, products::Product>(
            r#"
                INSERT INTO products (id, shop_id, name, slug, price_in_cents)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            "#,
        )
        .bind(utils::new_id())
        .bind(shop_id)
        .bind(name)
        .bind(slug)
        .bind(price_in_cents)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO product_prices (product_id, price_in_cents) VALUES ($1, $2)")
            .bind(&product.id)
            .bind(price_in_cents)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(product)
    }

    pub async fn list_products(
        &self,
        shop_id: Option<&str>,
    ) -> Result<Vec<products::Product>, RepositoryError> {
        let products = sqlx::query_as::<_, products::Product>(
            r#"
                SELECT * FROM products
                WHERE $1::TEXT IS NULL OR shop_id = $1
                ORDER BY price_in_cents, name
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(products)
    }

    pub async fn get_product_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<products::Product>, RepositoryError> {
        let product = sqlx::query_as::<_, products::Product>("SELECT * FROM products WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.conn)
            .await?;

        Ok(product)
    }

    /// Persists name, shop and price. A changed price is also logged as a snapshot.
    pub async fn update_product(
        &self,
        product: &products::Product,
        price_changed: bool,
    ) -> Result<products::Product, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let updated = sqlx::query_as::<_, products::Product>(
            r#"
                UPDATE products
                SET name = $1, shop_id = $2, price_in_cents = $3, updated_at = CURRENT_TIMESTAMP
                WHERE id = $4
                RETURNING *
            "#,
        )
        .bind(&product.name)
        .bind(&product.shop_id)
        .bind(product.price_in_cents)
        .bind(&product.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("product {}", product.slug)))?;

        if price_changed {
            sqlx::query("INSERT INTO product_prices (product_id, price_in_cents) VALUES ($1, $2)")
                .bind(&updated.id)
                .bind(updated.price_in_cents)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(updated)
    }

    pub async fn delete_product(&self, slug: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE slug = $1")
            .bind(slug)
            .execute(&self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("product {}", slug)));
        }

        Ok(())
    }

    /// Debits the buyer and records ownership plus a ledger row atomically.
    pub async fn purchase(
        &self,
        user_id: &str,
        slug: &str,
    ) -> Result<products::OwnedProduct, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let balance_in_cents: i64 =
            sqlx::query_scalar("SELECT balance_in_cents FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))?;

        let product = sqlx::query_as::<_, products::Product>("SELECT * FROM products WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("product {}", slug)))?;

        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM user_products WHERE user_id = $1 AND product_id = $2)",
        )
        .bind(user_id)
        .bind(&product.id)
        .fetch_one(&mut *tx)
        .await?;
        if owned {
            return Err(RepositoryError::Conflict(format!(
                "Product already owned: {}",
                slug
            )));
        }

        if balance_in_cents < product.price_in_cents {
            return Err(RepositoryError::InsufficientFunds {
                balance_in_cents,
                required_in_cents: product.price_in_cents,
            });
        }

        adjust_balance(&mut tx, user_id, -product.price_in_cents).await?;

        let purchased_at: chrono::NaiveDateTime = sqlx::query_scalar(
            "INSERT INTO user_products (user_id, product_id) VALUES ($1, $2) RETURNING purchased_at",
        )
        .bind(user_id)
        .bind(&product.id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
                INSERT INTO transactions (id, user_id, amount_in_cents, kind, method, status)
                VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(utils::new_id())
        .bind(user_id)
        .bind(product.price_in_cents)
        .bind(TransactionKind::Purchase.as_str())
        .bind(PaymentMethod::Balance.as_str())
        .bind(TransactionStatus::Completed.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(products::OwnedProduct {
            product,
            purchased_at,
        })
    }

    pub async fn list_owned(
        &self,
        user_id: &str,
    ) -> Result<Vec<products::OwnedProduct>, RepositoryError> {
        let products = sqlx::query_as::<_, products::OwnedProduct>(
            r#"
                SELECT p.*, up.purchased_at FROM user_products up
                JOIN products p ON p.id = up.product_id
                WHERE up.user_id = $1
                ORDER BY up.purchased_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(products)
    }
}
