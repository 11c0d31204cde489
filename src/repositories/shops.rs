use crate::models::shops;
use crate::utils;

use sqlx::PgPool;

use super::RepositoryError;

#[derive(Clone)]
pub struct ShopRepository {
    conn: PgPool,
}

impl ShopRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn insert_shop(
        &self,
        new_shop: &shops::NewShop,
        slug: &str,
    ) -> Result<shops::Shop, RepositoryError> {
        let shop = sqlx::query_as::<_, shops::Shop>(
            r#"
                INSERT INTO shops (id, name, slug, image_url, min_price_in_cents, max_price_in_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
            "#,
        )
        .bind(utils::new_id())
        .bind(new_shop.name.trim())
        .bind(slug)
        .bind(&new_shop.image_url)
        .bind(new_shop.min_price_in_cents)
        .bind(new_shop.max_price_in_cents)
        .fetch_one(&self.conn)
        .await?;

        Ok(shop)
    }

    pub async fn list_shops(&self) -> Result<Vec<shops::Shop>, RepositoryError> {
        let shops = sqlx::query_as::<_, shops::Shop>(
            "SELECT * FROM shops ORDER BY min_price_in_cents, name",
        )
        .fetch_all(&self.conn)
        .await?;

        Ok(shops)
    }

    pub async fn get_shop_by_slug(&self, slug: &str) -> Result<Option<shops::Shop>, RepositoryError> {
        let shop = sqlx::query_as::<_, shops::Shop>("SELECT * FROM shops WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.conn)
            .await?;

        Ok(shop)
    }

    pub async fn get_shop_by_id(&self, id: &str) -> Result<Option<shops::Shop>, RepositoryError> {
        let shop = sqlx::query_as::<_, shops::Shop>("SELECT * FROM shops WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(shop)
    }

    pub async fn update_shop(&self, shop: &shops::Shop) -> Result<shops::Shop, RepositoryError> {
        sqlx::query_as::<_, shops::Shop>(
            r#"
                UPDATE shops
                SET name = $1, image_url = $2, min_price_in_cents = $3, max_price_in_cents = $4
                WHERE id = $5
                RETURNING *
            "#,
        )
        .bind(&shop.name)
        .bind(&shop.image_url)
        .bind(shop.min_price_in_cents)
        .bind(shop.max_price_in_cents)
        .bind(&shop.id)
        .fetch_optional(&self.conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("shop {}", shop.slug)))
    }

    pub async fn delete_shop(&self, slug: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shops WHERE slug = $1")
            .bind(slug)
            .execute(&self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("shop {}", slug)));
        }

        Ok(())
    }
}
