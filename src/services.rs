use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::repositories::{payments::PaymentGateway, RepositoryError};
use crate::settings::Settings;

mod http;
mod price;
mod products;
mod rewards;
mod shops;
mod transactions;
mod users;

const QUEUE_CAPACITY: usize = 512;
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("External service error: {0} -> {1} => {2}")]
    ExternalService(String, String, String),
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => ServiceError::NotFound(what),
            RepositoryError::Conflict(what) => ServiceError::Conflict(what),
            e @ RepositoryError::InsufficientFunds { .. } => {
                ServiceError::InsufficientFunds(e.to_string())
            }
            RepositoryError::Database(e) => ServiceError::Database(e.to_string()),
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Enqueues `make_request()` on `channel` once per `period`.
pub fn schedule<T, F>(channel: mpsc::Sender<T>, period: Duration, make_request: F) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn() -> T + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately; jobs start one period after boot.
        interval.tick().await;

        loop {
            interval.tick().await;

            if let Err(e) = channel.send(make_request()).await {
                log::error!("Scheduler stopped, queue closed: {}", e);
                break;
            }
        }
    })
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let (user_tx, mut user_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (shop_tx, mut shop_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (product_tx, mut product_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (transaction_tx, mut transaction_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (reward_tx, mut reward_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (price_tx, mut price_rx) = mpsc::channel(QUEUE_CAPACITY);

    let mut user_service = users::UserService::new();
    let mut shop_service = shops::ShopService::new();
    let mut product_service = products::ProductService::new();
    let mut transaction_service = transactions::TransactionService::new();
    let mut reward_service = rewards::RewardService::new();
    let mut price_service = price::PriceService::new();

    log::info!("Starting user service.");
    let user_pool = pool.clone();
    let session_ttl = chrono::Duration::seconds(settings.auth.session_ttl_secs);
    tokio::spawn(async move {
        user_service
            .run(
                users::UserRequestHandler::new(user_pool, session_ttl),
                &mut user_rx,
            )
            .await;
    });

    log::info!("Starting shop service.");
    let shop_pool = pool.clone();
    tokio::spawn(async move {
        shop_service
            .run(shops::ShopRequestHandler::new(shop_pool), &mut shop_rx)
            .await;
    });

    log::info!("Starting product service.");
    let product_pool = pool.clone();
    tokio::spawn(async move {
        product_service
            .run(
                products::ProductRequestHandler::new(product_pool),
                &mut product_rx,
            )
            .await;
    });

    log::info!("Starting transaction service.");
    let transaction_pool = pool.clone();
    let gateway = PaymentGateway::new(
        settings.payments.auth_token.clone(),
        settings.payments.url.clone(),
    );
    let limits = transactions::AmountLimits {
        min_deposit_in_cents: settings.payments.min_deposit_in_cents,
        min_withdrawal_in_cents: settings.payments.min_withdrawal_in_cents,
    };
    tokio::spawn(async move {
        transaction_service
            .run(
                transactions::TransactionRequestHandler::new(transaction_pool, gateway, limits),
                &mut transaction_rx,
            )
            .await;
    });

    log::info!("Starting reward service.");
    let reward_pool = pool.clone();
    tokio::spawn(async move {
        reward_service
            .run(rewards::RewardRequestHandler::new(reward_pool), &mut reward_rx)
            .await;
    });

    log::info!("Starting price service.");
    let price_pool = pool.clone();
    let simulate_all_products = settings.prices.simulate_all_products;
    tokio::spawn(async move {
        price_service
            .run(
                price::PriceRequestHandler::new(price_pool, simulate_all_products),
                &mut price_rx,
            )
            .await;
    });

    log::info!(
        "Scheduling rewards every {}s and price simulation every {}s.",
        settings.rewards.interval_secs,
        settings.prices.interval_secs
    );
    schedule(
        reward_tx.clone(),
        Duration::from_secs(settings.rewards.interval_secs),
        || rewards::RewardRequest::Calculate { response: None },
    );
    schedule(
        price_tx.clone(),
        Duration::from_secs(settings.prices.interval_secs),
        || price::PriceRequest::Simulate { response: None },
    );
    schedule(user_tx.clone(), SESSION_PURGE_INTERVAL, || {
        users::UserRequest::PurgeSessions
    });

    log::info!("Starting HTTP server.");
    let state = http::AppState {
        user_channel: user_tx,
        shop_channel: shop_tx,
        product_channel: product_tx,
        transaction_channel: transaction_tx,
        reward_channel: reward_tx,
        price_channel: price_tx,
        webhook_secret: settings.payments.webhook_secret.into(),
    };

    http::start_http_server(&settings.http.listen, state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_errors_keep_their_meaning() {
        assert!(matches!(
            ServiceError::from(RepositoryError::NotFound("user 1".to_string())),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            ServiceError::from(RepositoryError::Conflict("email".to_string())),
            ServiceError::Conflict(_)
        ));

        let funds = ServiceError::from(RepositoryError::InsufficientFunds {
            balance_in_cents: 10,
            required_in_cents: 20,
        });
        assert!(matches!(funds, ServiceError::InsufficientFunds(ref m) if m.contains("required 20")));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_enqueues_each_period() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = schedule(tx, Duration::from_secs(60), || 7u8);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(rx.recv().await, Some(7));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(rx.recv().await, Some(7));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_stops_when_queue_closes() {
        let (tx, rx) = mpsc::channel::<u8>(1);
        drop(rx);

        let handle = schedule(tx, Duration::from_secs(1), || 1);
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(handle.await.is_ok());
    }
}
