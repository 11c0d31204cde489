use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::products::{self, NewProduct, OwnedProduct, ProductPrice, ProductUpdate};
use crate::models::shops::Shop;
use crate::repositories::{
    price::PriceRepository, products::ProductRepository, shops::ShopRepository,
};
use crate::utils;

pub const DEFAULT_HISTORY_LIMIT: i64 = 30;
const MAX_HISTORY_LIMIT: i64 = 500;

pub enum ProductRequest {
    CreateProduct {
        new_product: NewProduct,
        response: oneshot::Sender<Result<products::Product, ServiceError>>,
    },
    ListProducts {
        shop_slug: Option<String>,
        response: oneshot::Sender<Result<Vec<products::Product>, ServiceError>>,
    },
    GetProduct {
        slug: String,
        response: oneshot::Sender<Result<products::Product, ServiceError>>,
    },
    UpdateProduct {
        slug: String,
        update: ProductUpdate,
        response: oneshot::Sender<Result<products::Product, ServiceError>>,
    },
    DeleteProduct {
        slug: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    PriceHistory {
        slug: String,
        limit: Option<i64>,
        response: oneshot::Sender<Result<Vec<ProductPrice>, ServiceError>>,
    },
    Purchase {
        user_id: String,
        slug: String,
        response: oneshot::Sender<Result<OwnedProduct, ServiceError>>,
    },
    ListOwned {
        user_id: String,
        response: oneshot::Sender<Result<Vec<OwnedProduct>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct ProductRequestHandler {
    repository: ProductRepository,
    shops: ShopRepository,
    prices: PriceRepository,
}

impl ProductRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        Self {
            repository: ProductRepository::new(sql_conn.clone()),
            shops: ShopRepository::new(sql_conn.clone()),
            prices: PriceRepository::new(sql_conn),
        }
    }

    async fn find_shop(&self, slug: &str) -> Result<Shop, ServiceError> {
        self.shops
            .get_shop_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("shop {}", slug)))
    }

    async fn find_product(&self, slug: &str) -> Result<products::Product, ServiceError> {
        self.repository
            .get_product_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {}", slug)))
    }

    async fn create_product(
        &self,
        new_product: NewProduct,
    ) -> Result<products::Product, ServiceError> {
        products::validate_product_name(&new_product.name).map_err(ServiceError::Validation)?;
        products::validate_price(new_product.price_in_cents).map_err(ServiceError::Validation)?;

        let shop = self.find_shop(&new_product.shop_slug).await?;
        ensure_in_bucket(&shop, new_product.price_in_cents)?;

        let slug = utils::slugify(&new_product.name);
        if slug.is_empty() {
            return Err(ServiceError::Validation(format!(
                "Product name has no usable characters: {}",
                new_product.name
            )));
        }

        let product = self
            .repository
            .insert_product(
                &shop.id,
                new_product.name.trim(),
                &slug,
                new_product.price_in_cents,
            )
            .await?;
        log::info!("Created product {} in shop {}.", product.slug, shop.slug);

        Ok(product)
    }

    async fn list_products(
        &self,
        shop_slug: Option<String>,
    ) -> Result<Vec<products::Product>, ServiceError> {
        let shop = match shop_slug {
            Some(slug) => Some(self.find_shop(&slug).await?),
            None => None,
        };

        Ok(self
            .repository
            .list_products(shop.as_ref().map(|s| s.id.as_str()))
            .await?)
    }

    async fn update_product(
        &self,
        slug: &str,
        update: ProductUpdate,
    ) -> Result<products::Product, ServiceError> {
        let mut product = self.find_product(slug).await?;

        if let Some(name) = &update.name {
            products::validate_product_name(name).map_err(ServiceError::Validation)?;
            product.name = name.trim().to_string();
        }

        let shop = match &update.shop_slug {
            Some(shop_slug) => self.find_shop(shop_slug).await?,
            None => self.shops.get_shop_by_id(&product.shop_id).await?.ok_or_else(|| {
                ServiceError::Internal(format!("Product {} has no shop.", product.slug))
            })?,
        };
        product.shop_id = shop.id.clone();

        let price_changed = match update.price_in_cents {
            Some(price) if price != product.price_in_cents => {
                products::validate_price(price).map_err(ServiceError::Validation)?;
                product.price_in_cents = price;
                true
            }
            _ => false,
        };

        // Only prices set by hand are checked against the bucket; simulated
        // prices are allowed to drift out of it.
        if price_changed || update.shop_slug.is_some() {
            ensure_in_bucket(&shop, product.price_in_cents)?;
        }

        Ok(self.repository.update_product(&product, price_changed).await?)
    }

    async fn price_history(
        &self,
        slug: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ProductPrice>, ServiceError> {
        let product = self.find_product(slug).await?;
        let limit = history_limit(limit);

        Ok(self.prices.recent_prices(&product.id, limit).await?)
    }

    async fn purchase(&self, user_id: &str, slug: &str) -> Result<OwnedProduct, ServiceError> {
        let owned = self.repository.purchase(user_id, slug).await?;
        log::info!(
            "User {} bought {} for {} cents.",
            user_id,
            owned.product.slug,
            owned.product.price_in_cents
        );

        Ok(owned)
    }
}

fn ensure_in_bucket(shop: &Shop, price_in_cents: i64) -> Result<(), ServiceError> {
    if !shop.accepts_price(price_in_cents) {
        return Err(ServiceError::Validation(format!(
            "Price {} is outside shop {} range {}..={}.",
            price_in_cents, shop.slug, shop.min_price_in_cents, shop.max_price_in_cents
        )));
    }

    Ok(())
}

fn history_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

#[async_trait]
impl RequestHandler<ProductRequest> for ProductRequestHandler {
    async fn handle_request(&self, request: ProductRequest) {
        match request {
            ProductRequest::CreateProduct {
                new_product,
                response,
            } => {
                let product = self.create_product(new_product).await;
                let _ = response.send(product);
            }
            ProductRequest::ListProducts {
                shop_slug,
                response,
            } => {
                let products = self.list_products(shop_slug).await;
                let _ = response.send(products);
            }
            ProductRequest::GetProduct { slug, response } => {
                let product = self.find_product(&slug).await;
                let _ = response.send(product);
            }
            ProductRequest::UpdateProduct {
                slug,
                update,
                response,
            } => {
                let product = self.update_product(&slug, update).await;
                let _ = response.send(product);
            }
            ProductRequest::DeleteProduct { slug, response } => {
                let result = self
                    .repository
                    .delete_product(&slug)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
            ProductRequest::PriceHistory {
                slug,
                limit,
                response,
            } => {
                let history = self.price_history(&slug, limit).await;
                let _ = response.send(history);
            }
            ProductRequest::Purchase {
                user_id,
                slug,
                response,
            } => {
                let owned = self.purchase(&user_id, &slug).await;
                let _ = response.send(owned);
            }
            ProductRequest::ListOwned { user_id, response } => {
                let owned = self
                    .repository
                    .list_owned(&user_id)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(owned);
            }
        }
    }
}

pub struct ProductService;

impl ProductService {
    pub fn new() -> Self {
        ProductService {}
    }
}

#[async_trait]
impl Service<ProductRequest, ProductRequestHandler> for ProductService {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_limit_defaults_and_clamps() {
        assert_eq!(history_limit(None), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history_limit(Some(0)), 1);
        assert_eq!(history_limit(Some(10_000)), MAX_HISTORY_LIMIT);
        assert_eq!(history_limit(Some(5)), 5);
    }

    #[test]
    fn bucket_check_reports_range() {
        let shop = Shop {
            id: "s".to_string(),
            name: "Budget".to_string(),
            slug: "budget".to_string(),
            image_url: None,
            min_price_in_cents: 100,
            max_price_in_cents: 500,
            created_at: chrono::NaiveDateTime::default(),
        };

        assert!(ensure_in_bucket(&shop, 300).is_ok());
        match ensure_in_bucket(&shop, 501) {
            Err(ServiceError::Validation(message)) => assert!(message.contains("100..=500")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[sqlx::test]
    async fn product_outside_shop_range_is_rejected(pool: sqlx::PgPool) {
        let shop = crate::repositories::fixtures::shop(&pool, "Starter", 1_000, 5_000).await;
        let handler = ProductRequestHandler::new(pool);

        let result = handler
            .create_product(NewProduct {
                shop_slug: shop.slug.clone(),
                name: "Mega Rig".to_string(),
                price_in_cents: 900_000,
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let created = handler
            .create_product(NewProduct {
                shop_slug: shop.slug,
                name: "Small Rig".to_string(),
                price_in_cents: 5_000,
            })
            .await
            .unwrap();
        assert_eq!(created.slug, "small-rig");
    }
}
