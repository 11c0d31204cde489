use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::rewards::RewardSummary;
use crate::repositories::rewards::RewardRepository;

pub enum RewardRequest {
    /// Runs one accrual pass. Scheduled runs carry no responder.
    Calculate {
        response: Option<oneshot::Sender<Result<RewardSummary, ServiceError>>>,
    },
}

#[derive(Clone)]
pub struct RewardRequestHandler {
    repository: RewardRepository,
}

impl RewardRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        Self {
            repository: RewardRepository::new(sql_conn),
        }
    }

    async fn calculate(&self) -> Result<RewardSummary, ServiceError> {
        match self.repository.accrue_rewards().await {
            Ok(summary) => {
                log::info!(
                    "Reward accrual paid {} cents to {} users.",
                    summary.total_paid_in_cents,
                    summary.users_rewarded
                );
                Ok(summary)
            }
            Err(e) => {
                log::error!("Reward accrual rolled back: {}", e);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl RequestHandler<RewardRequest> for RewardRequestHandler {
    async fn handle_request(&self, request: RewardRequest) {
        match request {
            RewardRequest::Calculate { response } => {
                let summary = self.calculate().await;
                if let Some(response) = response {
                    let _ = response.send(summary);
                }
            }
        }
    }
}

pub struct RewardService;

impl RewardService {
    pub fn new() -> Self {
        RewardService {}
    }
}

#[async_trait]
impl Service<RewardRequest, RewardRequestHandler> for RewardService {}
