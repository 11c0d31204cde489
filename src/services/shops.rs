use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::shops::{self, NewShop, ShopDetails, ShopUpdate};
use crate::repositories::{products::ProductRepository, shops::ShopRepository};
use crate::utils;

pub enum ShopRequest {
    CreateShop {
        new_shop: NewShop,
        response: oneshot::Sender<Result<shops::Shop, ServiceError>>,
    },
    ListShops {
        response: oneshot::Sender<Result<Vec<shops::Shop>, ServiceError>>,
    },
    GetShop {
        slug: String,
        response: oneshot::Sender<Result<ShopDetails, ServiceError>>,
    },
    UpdateShop {
        slug: String,
        update: ShopUpdate,
        response: oneshot::Sender<Result<shops::Shop, ServiceError>>,
    },
    DeleteShop {
        slug: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
}

#[derive(Clone)]
pub struct ShopRequestHandler {
    repository: ShopRepository,
    products: ProductRepository,
}

impl ShopRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        Self {
            repository: ShopRepository::new(sql_conn.clone()),
            products: ProductRepository::new(sql_conn),
        }
    }

    async fn create_shop(&self, new_shop: NewShop) -> Result<shops::Shop, ServiceError> {
        new_shop.validate().map_err(ServiceError::Validation)?;

        let slug = utils::slugify(&new_shop.name);
        if slug.is_empty() {
            return Err(ServiceError::Validation(format!(
                "Shop name has no usable characters: {}",
                new_shop.name
            )));
        }

        let shop = self.repository.insert_shop(&new_shop, &slug).await?;
        log::info!("Created shop {}.", shop.slug);

        Ok(shop)
    }

    async fn find_shop(&self, slug: &str) -> Result<shops::Shop, ServiceError> {
        self.repository
            .get_shop_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("shop {}", slug)))
    }

    async fn get_shop(&self, slug: &str) -> Result<ShopDetails, ServiceError> {
        let shop = self.find_shop(slug).await?;
        let products = self.products.list_products(Some(&shop.id)).await?;

        Ok(ShopDetails { shop, products })
    }

    async fn update_shop(&self, slug: &str, update: ShopUpdate) -> Result<shops::Shop, ServiceError> {
        let shop = self.find_shop(slug).await?;
        let updated = update.apply(&shop).map_err(ServiceError::Validation)?;

        if updated.min_price_in_cents != shop.min_price_in_cents
            || updated.max_price_in_cents != shop.max_price_in_cents
        {
            let products = self.products.list_products(Some(&shop.id)).await?;
            let excluded = shop.excluded_by(&updated, &products);
            if !excluded.is_empty() {
                let slugs: Vec<&str> = excluded.iter().map(|p| p.slug.as_str()).collect();
                return Err(ServiceError::Validation(format!(
                    "New range {}..={} would exclude products: {}.",
                    updated.min_price_in_cents,
                    updated.max_price_in_cents,
                    slugs.join(", ")
                )));
            }
        }

        Ok(self.repository.update_shop(&updated).await?)
    }
}

#[async_trait]
impl RequestHandler<ShopRequest> for ShopRequestHandler {
    async fn handle_request(&self, request: ShopRequest) {
        match request {
            ShopRequest::CreateShop { new_shop, response } => {
                let shop = self.create_shop(new_shop).await;
                let _ = response.send(shop);
            }
            ShopRequest::ListShops { response } => {
                let shops = self.repository.list_shops().await.map_err(ServiceError::from);
                let _ = response.send(shops);
            }
            ShopRequest::GetShop { slug, response } => {
                let shop = self.get_shop(&slug).await;
                let _ = response.send(shop);
            }
            ShopRequest::UpdateShop {
                slug,
                update,
                response,
            } => {
                let shop = self.update_shop(&slug, update).await;
                let _ = response.send(shop);
            }
            ShopRequest::DeleteShop { slug, response } => {
                let result = self
                    .repository
                    .delete_shop(&slug)
                    .await
                    .map_err(ServiceError::from);
                if result.is_ok() {
                    log::info!("Deleted shop {}.", slug);
                }
                let _ = response.send(result);
            }
        }
    }
}

pub struct ShopService;

impl ShopService {
    pub fn new() -> Self {
        ShopService {}
    }
}

#[async_trait]
impl Service<ShopRequest, ShopRequestHandler> for ShopService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::fixtures;

    #[sqlx::test]
    async fn narrowing_range_may_not_strand_products(pool: PgPool) {
        let shop = fixtures::shop(&pool, "Starter", 1_000, 10_000).await;
        fixtures::product(&pool, &shop.id, "Small Rig", 1_500).await;
        let handler = ShopRequestHandler::new(pool);

        let narrowed = handler
            .update_shop(
                &shop.slug,
                ShopUpdate {
                    min_price_in_cents: Some(2_000),
                    ..Default::default()
                },
            )
            .await;
        match narrowed {
            Err(ServiceError::Validation(message)) => assert!(message.contains("small-rig")),
            other => panic!("unexpected result: {:?}", other.map(|s| s.slug)),
        }

        let widened = handler
            .update_shop(
                &shop.slug,
                ShopUpdate {
                    max_price_in_cents: Some(20_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(widened.max_price_in_cents, 20_000);
    }
}
