use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::{dispatch, ApiError, ApiPath, ApiQuery, AppState, AuthUser};
use crate::services::products::ProductRequest;
use crate::services::shops::ShopRequest;

#[derive(Deserialize)]
pub struct ProductFilter {
    shop: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    limit: Option<i64>,
}

pub async fn list_shops(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let shops = dispatch(&state.shop_channel, |response| ShopRequest::ListShops { response }).await?;

    Ok(Json(shops))
}

pub async fn get_shop(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let shop = dispatch(&state.shop_channel, |response| ShopRequest::GetShop {
        slug,
        response,
    })
    .await?;

    Ok(Json(shop))
}

pub async fn list_products(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ProductFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let products = dispatch(&state.product_channel, |response| {
        ProductRequest::ListProducts {
            shop_slug: filter.shop,
            response,
        }
    })
    .await?;

    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let product = dispatch(&state.product_channel, |response| ProductRequest::GetProduct {
        slug,
        response,
    })
    .await?;

    Ok(Json(product))
}

pub async fn price_history(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let history = dispatch(&state.product_channel, |response| {
        ProductRequest::PriceHistory {
            slug,
            limit: query.limit,
            response,
        }
    })
    .await?;

    Ok(Json(history))
}

pub async fn purchase(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(slug): ApiPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owned = dispatch(&state.product_channel, |response| ProductRequest::Purchase {
        user_id: auth.user.id,
        slug,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(owned)))
}

pub async fn owned_products(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let owned = dispatch(&state.product_channel, |response| ProductRequest::ListOwned {
        user_id: auth.user.id,
        response,
    })
    .await?;

    Ok(Json(owned))
}

#[cfg(test)]
mod tests {
    use super::super::{router, test_support::*};
    use crate::models::products::ProductPrice;
    use crate::repositories::RepositoryError;
    use crate::services::ServiceError;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn purchase_without_funds_is_unprocessable() {
        let (state, queues) = state();
        serve_sessions(queues.users, Some(user(false)));
        let mut products = queues.products;
        tokio::spawn(async move {
            if let Some(ProductRequest::Purchase {
                user_id,
                slug,
                response,
            }) = products.recv().await
            {
                assert_eq!(user_id, "user-1");
                assert_eq!(slug, "antminer-s19");
                let _ = response.send(Err(ServiceError::from(
                    RepositoryError::InsufficientFunds {
                        balance_in_cents: 5_000,
                        required_in_cents: 250_000,
                    },
                )));
            }
        });

        let response = router(state)
            .oneshot(
                Request::post("/products/antminer-s19/purchase")
                    .header("authorization", "Bearer token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "insufficient_funds");
    }

    #[tokio::test]
    async fn price_history_passes_limit() {
        let (state, mut queues) = state();
        tokio::spawn(async move {
            if let Some(ProductRequest::PriceHistory {
                slug,
                limit,
                response,
            }) = queues.products.recv().await
            {
                assert_eq!(slug, "gpu-rig");
                assert_eq!(limit, Some(2));
                let prices = vec![
                    ProductPrice {
                        id: 1,
                        product_id: "p".to_string(),
                        price_in_cents: 1_000,
                        created_at: chrono::NaiveDateTime::default(),
                    },
                    ProductPrice {
                        id: 2,
                        product_id: "p".to_string(),
                        price_in_cents: 1_040,
                        created_at: chrono::NaiveDateTime::default(),
                    },
                ];
                let _ = response.send(Ok(prices));
            }
        });

        let response = router(state)
            .oneshot(
                Request::get("/products/gpu-rig/prices?limit=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(2));
        assert_eq!(body[1]["price_in_cents"], 1_040);
    }

    #[tokio::test]
    async fn non_numeric_history_limit_is_a_bad_request() {
        let (state, _queues) = state();

        let response = router(state)
            .oneshot(
                Request::get("/products/gpu-rig/prices?limit=lots")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn unknown_shop_is_not_found() {
        let (state, mut queues) = state();
        tokio::spawn(async move {
            if let Some(ShopRequest::GetShop { slug, response }) = queues.shops.recv().await {
                let _ = response.send(Err(ServiceError::NotFound(format!("shop {}", slug))));
            }
        });

        let response = router(state)
            .oneshot(Request::get("/shops/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["details"], "Not found: shop nowhere");
    }
}
