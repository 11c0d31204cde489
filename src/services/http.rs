use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::{
    price::PriceRequest, products::ProductRequest, rewards::RewardRequest, shops::ShopRequest,
    transactions::TransactionServiceRequest, users::UserRequest, ServiceError,
};
use crate::models::users::User;

mod admin;
mod catalog;
mod transactions;
mod users;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;
const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Clone)]
pub struct AppState {
    pub user_channel: mpsc::Sender<UserRequest>,
    pub shop_channel: mpsc::Sender<ShopRequest>,
    pub product_channel: mpsc::Sender<ProductRequest>,
    pub transaction_channel: mpsc::Sender<TransactionServiceRequest>,
    pub reward_channel: mpsc::Sender<RewardRequest>,
    pub price_channel: mpsc::Sender<PriceRequest>,
    pub webhook_secret: Arc<str>,
}

/// Service errors rendered as the `{"error", "details"}` envelope.
#[derive(Debug)]
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            ServiceError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            ServiceError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServiceError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ServiceError::InsufficientFunds(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds")
            }
            ServiceError::ExternalService(..) => (StatusCode::BAD_GATEWAY, "external_service"),
            ServiceError::Internal(_)
            | ServiceError::Database(_)
            | ServiceError::Communication(..) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        let details = if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
            "Internal server error.".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(json!({ "error": kind, "details": details }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(ServiceError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(ServiceError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(ServiceError::Validation(rejection.body_text()))
    }
}

/// JSON body whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Sends a request built around a fresh responder and waits for the answer.
pub async fn dispatch<T, R, F>(channel: &mpsc::Sender<T>, make_request: F) -> Result<R, ApiError>
where
    F: FnOnce(oneshot::Sender<Result<R, ServiceError>>) -> T,
{
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(make_request(response_tx))
        .await
        .map_err(|e| ServiceError::Communication("HTTP".to_string(), e.to_string()))?;

    let result = response_rx
        .await
        .map_err(|e| ServiceError::Communication("HTTP".to_string(), e.to_string()))?;

    Ok(result?)
}

/// The user behind a valid `Authorization: Bearer` session token.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token.".to_string()))?;

        let user = dispatch(&state.user_channel, |response| UserRequest::Authenticate {
            token: token.clone(),
            response,
        })
        .await?;

        Ok(AuthUser { user, token })
    }
}

pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser { user, .. } = AuthUser::from_request_parts(parts, state).await?;

        if !user.is_admin {
            return Err(ServiceError::Forbidden("Administrator access required.".to_string()).into());
        }

        Ok(AdminUser(user))
    }
}

/// A caller presenting the payment provider's webhook secret. Checked from the
/// headers alone, before any body is read.
pub struct WebhookCaller;

impl FromRequestParts<AppState> for WebhookCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(WEBHOOK_SECRET_HEADER)
            .map(|value| value.as_bytes())
            .unwrap_or_default();

        if !bool::from(presented.ct_eq(state.webhook_secret.as_bytes())) {
            log::warn!("Rejected provider callback: bad webhook secret.");
            return Err(ServiceError::Unauthorized("Invalid webhook secret.".to_string()).into());
        }

        Ok(WebhookCaller)
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn bounds(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);

        (limit, offset)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/auth/register", post(users::register))
        .route("/auth/login", post(users::login))
        .route("/auth/logout", post(users::logout))
        .route("/me", get(users::me).put(users::update_me))
        .route("/me/mining-bot", put(users::set_mining_bot))
        .route("/me/referrals", get(users::referrals))
        .route("/me/products", get(catalog::owned_products))
        .route("/me/transactions", get(transactions::my_transactions))
        .route("/me/deposits", post(transactions::deposit))
        .route("/me/withdrawals", post(transactions::withdraw))
        .route("/shops", get(catalog::list_shops))
        .route("/shops/{slug}", get(catalog::get_shop))
        .route("/products", get(catalog::list_products))
        .route("/products/{slug}", get(catalog::get_product))
        .route("/products/{slug}/prices", get(catalog::price_history))
        .route("/products/{slug}/purchase", post(catalog::purchase))
        .route("/payments/callback", post(transactions::provider_callback))
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}", get(admin::get_user))
        .route("/admin/users/{id}/admin", put(admin::set_admin))
        .route("/admin/transactions", get(admin::list_transactions))
        .route("/admin/shops", post(admin::create_shop))
        .route(
            "/admin/shops/{slug}",
            put(admin::update_shop).delete(admin::delete_shop),
        )
        .route("/admin/products", post(admin::create_product))
        .route(
            "/admin/products/{slug}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route("/admin/jobs/rewards", post(admin::run_rewards))
        .route("/admin/jobs/prices", post(admin::run_price_simulation))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(listen: &str, state: AppState) -> Result<(), anyhow::Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub struct Queues {
        pub users: mpsc::Receiver<UserRequest>,
        pub shops: mpsc::Receiver<ShopRequest>,
        pub products: mpsc::Receiver<ProductRequest>,
        pub transactions: mpsc::Receiver<TransactionServiceRequest>,
        pub rewards: mpsc::Receiver<RewardRequest>,
        pub prices: mpsc::Receiver<PriceRequest>,
    }

    pub const WEBHOOK_SECRET: &str = "test-secret";

    pub fn state() -> (AppState, Queues) {
        let (user_channel, users) = mpsc::channel(8);
        let (shop_channel, shops) = mpsc::channel(8);
        let (product_channel, products) = mpsc::channel(8);
        let (transaction_channel, transactions) = mpsc::channel(8);
        let (reward_channel, rewards) = mpsc::channel(8);
        let (price_channel, prices) = mpsc::channel(8);

        let state = AppState {
            user_channel,
            shop_channel,
            product_channel,
            transaction_channel,
            reward_channel,
            price_channel,
            webhook_secret: WEBHOOK_SECRET.into(),
        };

        (
            state,
            Queues {
                users,
                shops,
                products,
                transactions,
                rewards,
                prices,
            },
        )
    }

    pub fn user(is_admin: bool) -> User {
        User {
            id: "user-1".to_string(),
            email: "miner@example.com".to_string(),
            username: "miner".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            balance_in_cents: 5_000,
            referral_code: "ABCD1234".to_string(),
            referred_by: None,
            referral_rate_bp: 100,
            referral_count: 0,
            pending_bonus_in_cents: 0,
            mining_bot: false,
            is_admin,
            created_at: chrono::NaiveDateTime::default(),
            updated_at: chrono::NaiveDateTime::default(),
        }
    }

    /// Answers every session lookup with `user`, or rejects it when `None`.
    pub fn serve_sessions(mut users: mpsc::Receiver<UserRequest>, user: Option<User>) {
        tokio::spawn(async move {
            while let Some(request) = users.recv().await {
                if let UserRequest::Authenticate { response, .. } = request {
                    let result = user
                        .clone()
                        .ok_or_else(|| ServiceError::Unauthorized("expired".to_string()));
                    let _ = response.send(result);
                }
            }
        });
    }

    pub async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
