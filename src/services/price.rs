use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::repositories::price::PriceRepository;

/// Snapshots used to derive the trend.
const TREND_WINDOW: i64 = 5;
/// Largest relative move per step, in either direction.
const MAX_STEP: f64 = 0.05;

pub enum PriceRequest {
    Simulate {
        response: Option<oneshot::Sender<Result<SimulationSummary, ServiceError>>>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SimulationSummary {
    pub products_updated: u64,
}

/// Mean of the relative changes between consecutive prices.
pub fn trend(history: &[i64]) -> f64 {
    let changes: Vec<f64> = history
        .windows(2)
        .filter(|pair| pair[0] > 0)
        .map(|pair| (pair[1] - pair[0]) as f64 / pair[0] as f64)
        .collect();

    if changes.is_empty() {
        return 0.0;
    }
    changes.iter().sum::<f64>() / changes.len() as f64
}

/// Next price after one bounded random-walk step. `history` is oldest first;
/// an empty history has no next price.
pub fn next_price<R: Rng>(history: &[i64], rng: &mut R) -> Option<i64> {
    let last = *history.last()?;
    let noise = rng.gen_range(-MAX_STEP..=MAX_STEP);
    let step = (trend(history) + noise).clamp(-MAX_STEP, MAX_STEP);

    Some(((last as f64) * (1.0 + step)).round().max(1.0) as i64)
}

#[derive(Clone)]
pub struct PriceRequestHandler {
    repository: PriceRepository,
    simulate_all_products: bool,
}

impl PriceRequestHandler {
    pub fn new(sql_conn: PgPool, simulate_all_products: bool) -> Self {
        Self {
            repository: PriceRepository::new(sql_conn),
            simulate_all_products,
        }
    }

    async fn simulate(&self) -> Result<SimulationSummary, ServiceError> {
        let products = self
            .repository
            .simulation_candidates(self.simulate_all_products)
            .await?;
        let mut rng = StdRng::from_entropy();
        let mut summary = SimulationSummary::default();

        for product in products {
            let mut history: Vec<i64> = self
                .repository
                .recent_prices(&product.id, TREND_WINDOW)
                .await?
                .into_iter()
                .map(|p| p.price_in_cents)
                .collect();
            if history.is_empty() {
                history.push(product.price_in_cents);
            }

            let Some(price) = next_price(&history, &mut rng) else {
                continue;
            };
            self.repository.record_price(&product.id, price).await?;

            log::debug!(
                "Price of {} moved {} -> {}.",
                product.slug,
                product.price_in_cents,
                price
            );
            summary.products_updated += 1;
        }

        log::info!(
            "Price simulation updated {} products.",
            summary.products_updated
        );
        Ok(summary)
    }
}

#[async_trait]
impl RequestHandler<PriceRequest> for PriceRequestHandler {
    async fn handle_request(&self, request: PriceRequest) {
        match request {
            PriceRequest::Simulate { response } => {
                let summary = self.simulate().await;
                if let Err(e) = &summary {
                    log::error!("Price simulation aborted: {}", e);
                }
                if let Some(response) = response {
                    let _ = response.send(summary);
                }
            }
        }
    }
}

pub struct PriceService;

impl PriceService {
    pub fn new() -> Self {
        PriceService {}
    }
}

#[async_trait]
impl Service<PriceRequest, PriceRequestHandler> for PriceService {}
