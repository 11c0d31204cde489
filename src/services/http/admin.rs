use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::{dispatch, AdminUser, ApiError, ApiJson, ApiPath, ApiQuery, AppState, Pagination};
use crate::models::products::{NewProduct, ProductUpdate};
use crate::models::shops::{NewShop, ShopUpdate};
use crate::services::{
    price::PriceRequest, products::ProductRequest, rewards::RewardRequest, shops::ShopRequest,
    transactions::TransactionServiceRequest, users::UserRequest,
};

#[derive(Deserialize)]
pub struct AdminToggle {
    is_admin: bool,
}

pub async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    let stats = dispatch(&state.transaction_channel, |response| {
        TransactionServiceRequest::Dashboard { response }
    })
    .await?;

    Ok(Json(stats))
}

pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.bounds();
    let users = dispatch(&state.user_channel, |response| UserRequest::ListUsers {
        limit,
        offset,
        response,
    })
    .await?;

    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = dispatch(&state.user_channel, |response| UserRequest::GetUser { id, response }).await?;

    Ok(Json(user))
}

pub async fn set_admin(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(toggle): ApiJson<AdminToggle>,
) -> Result<impl IntoResponse, ApiError> {
    let user = dispatch(&state.user_channel, |response| UserRequest::SetAdmin {
        id,
        is_admin: toggle.is_admin,
        response,
    })
    .await?;
    log::info!(
        "{} set admin={} for {}.",
        admin.username,
        user.is_admin,
        user.username
    );

    Ok(Json(user))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.bounds();
    let transactions = dispatch(&state.transaction_channel, |response| {
        TransactionServiceRequest::ListAll {
            limit,
            offset,
            response,
        }
    })
    .await?;

    Ok(Json(transactions))
}

pub async fn create_shop(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiJson(new_shop): ApiJson<NewShop>,
) -> Result<impl IntoResponse, ApiError> {
    let shop = dispatch(&state.shop_channel, |response| ShopRequest::CreateShop {
        new_shop,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(shop)))
}

pub async fn update_shop(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(slug): ApiPath<String>,
    ApiJson(update): ApiJson<ShopUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let shop = dispatch(&state.shop_channel, |response| ShopRequest::UpdateShop {
        slug,
        update,
        response,
    })
    .await?;

    Ok(Json(shop))
}

pub async fn delete_shop(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(slug): ApiPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    dispatch(&state.shop_channel, |response| ShopRequest::DeleteShop {
        slug,
        response,
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiJson(new_product): ApiJson<NewProduct>,
) -> Result<impl IntoResponse, ApiError> {
    let product = dispatch(&state.product_channel, |response| {
        ProductRequest::CreateProduct {
            new_product,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(slug): ApiPath<String>,
    ApiJson(update): ApiJson<ProductUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let product = dispatch(&state.product_channel, |response| {
        ProductRequest::UpdateProduct {
            slug,
            update,
            response,
        }
    })
    .await?;

    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(slug): ApiPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    dispatch(&state.product_channel, |response| {
        ProductRequest::DeleteProduct { slug, response }
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn run_rewards(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    log::info!("{} triggered reward accrual.", admin.username);
    let summary = dispatch(&state.reward_channel, |response| RewardRequest::Calculate {
        response: Some(response),
    })
    .await?;

    Ok(Json(summary))
}

pub async fn run_price_simulation(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    log::info!("{} triggered price simulation.", admin.username);
    let summary = dispatch(&state.price_channel, |response| PriceRequest::Simulate {
        response: Some(response),
    })
    .await?;

    Ok(Json(summary))
}
