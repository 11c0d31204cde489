use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::transactions::{
    self, DashboardStats, Deposit, ProviderCallback, TransactionStatus,
};
use crate::repositories::{payments::PaymentGateway, transactions::TransactionRepository};
use crate::utils;

pub enum TransactionServiceRequest {
    Deposit {
        user_id: String,
        amount_in_cents: i64,
        response: oneshot::Sender<Result<Deposit, ServiceError>>,
    },
    Withdraw {
        user_id: String,
        amount_in_cents: i64,
        destination: String,
        response: oneshot::Sender<Result<transactions::Transaction, ServiceError>>,
    },
    ProviderCallback {
        callback: ProviderCallback,
        response: oneshot::Sender<Result<transactions::Transaction, ServiceError>>,
    },
    ListForUser {
        user_id: String,
        response: oneshot::Sender<Result<Vec<transactions::Transaction>, ServiceError>>,
    },
    ListAll {
        limit: i64,
        offset: i64,
        response: oneshot::Sender<Result<Vec<transactions::Transaction>, ServiceError>>,
    },
    Dashboard {
        response: oneshot::Sender<Result<DashboardStats, ServiceError>>,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct AmountLimits {
    pub min_deposit_in_cents: i64,
    pub min_withdrawal_in_cents: i64,
}

#[derive(Clone)]
pub struct TransactionRequestHandler {
    repository: TransactionRepository,
    gateway: PaymentGateway,
    limits: AmountLimits,
}

impl TransactionRequestHandler {
    pub fn new(sql_conn: PgPool, gateway: PaymentGateway, limits: AmountLimits) -> Self {
        let repository = TransactionRepository::new(sql_conn);

        TransactionRequestHandler {
            repository,
            gateway,
            limits,
        }
    }

    async fn deposit(&self, user_id: &str, amount_in_cents: i64) -> Result<Deposit, ServiceError> {
        validate_amount(amount_in_cents, self.limits.min_deposit_in_cents)?;

        let reference = utils::new_id();
        let invoice = self
            .gateway
            .create_invoice(amount_in_cents, &reference)
            .await
            .map_err(|e| {
                ServiceError::ExternalService(
                    "TransactionService".to_string(),
                    "PaymentGateway".to_string(),
                    e.to_string(),
                )
            })?;

        let transaction = self
            .repository
            .new_deposit(user_id, amount_in_cents, &invoice.id)
            .await?;
        log::info!(
            "Deposit {} of {} cents opened for {} (invoice {}).",
            transaction.id,
            amount_in_cents,
            user_id,
            invoice.id
        );

        Ok(Deposit {
            transaction_id: transaction.id,
            amount_in_cents,
            payment_url: invoice.payment_url,
        })
    }

    async fn withdraw(
        &self,
        user_id: &str,
        amount_in_cents: i64,
        destination: &str,
    ) -> Result<transactions::Transaction, ServiceError> {
        validate_amount(amount_in_cents, self.limits.min_withdrawal_in_cents)?;
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(ServiceError::Validation(
                "Withdrawal destination cannot be empty.".to_string(),
            ));
        }

        let transaction = self
            .repository
            .new_withdrawal(user_id, amount_in_cents)
            .await?;

        let payout = match self
            .gateway
            .create_payout(amount_in_cents, destination, &transaction.id)
            .await
        {
            Ok(payout) => payout,
            Err(e) => {
                log::error!("Payout for withdrawal {} failed: {}", transaction.id, e);
                if let Err(refund) = self
                    .repository
                    .settle(&transaction.id, TransactionStatus::Failed)
                    .await
                {
                    log::error!(
                        "Could not refund withdrawal {} of {} cents to {}: {}",
                        transaction.id,
                        amount_in_cents,
                        user_id,
                        refund
                    );
                }
                return Err(ServiceError::ExternalService(
                    "TransactionService".to_string(),
                    "PaymentGateway".to_string(),
                    e.to_string(),
                ));
            }
        };

        let status = TransactionStatus::from_provider(&payout.status);
        match self
            .repository
            .record_payout(&transaction.id, &payout.id, status)
            .await
        {
            Ok(transaction) => Ok(transaction),
            Err(e) => {
                // The payout is in flight; its callback finds the row by reference.
                log::error!(
                    "Could not record payout {} for withdrawal {}: {}",
                    payout.id,
                    transaction.id,
                    e
                );
                Ok(transaction)
            }
        }
    }

    async fn provider_callback(
        &self,
        callback: ProviderCallback,
    ) -> Result<transactions::Transaction, ServiceError> {
        let status =
            TransactionStatus::from_provider(&callback.status).unwrap_or(TransactionStatus::Pending);

        let transaction = self
            .repository
            .settle_external(&callback.id, callback.reference.as_deref(), status)
            .await?;
        log::info!(
            "Provider reported {} for {} ({}): transaction is {}.",
            callback.status,
            callback.id,
            transaction.kind,
            transaction.status
        );

        Ok(transaction)
    }
}

fn validate_amount(amount_in_cents: i64, minimum_in_cents: i64) -> Result<(), ServiceError> {
    if amount_in_cents <= 0 || amount_in_cents < minimum_in_cents {
        return Err(ServiceError::Validation(format!(
            "Amount must be at least {} cents, got {}.",
            minimum_in_cents.max(1),
            amount_in_cents
        )));
    }

    Ok(())
}

#[async_trait]
impl RequestHandler<TransactionServiceRequest> for TransactionRequestHandler {
    async fn handle_request(&self, request: TransactionServiceRequest) {
        match request {
            TransactionServiceRequest::Deposit {
                user_id,
                amount_in_cents,
                response,
            } => {
                let deposit = self.deposit(&user_id, amount_in_cents).await;
                let _ = response.send(deposit);
            }
            TransactionServiceRequest::Withdraw {
                user_id,
                amount_in_cents,
                destination,
                response,
            } => {
                let result = self.withdraw(&user_id, amount_in_cents, &destination).await;
                let _ = response.send(result);
            }
            TransactionServiceRequest::ProviderCallback { callback, response } => {
                let result = self.provider_callback(callback).await;
                let _ = response.send(result);
            }
            TransactionServiceRequest::ListForUser { user_id, response } => {
                let result = self
                    .repository
                    .list_for_user(&user_id)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
            TransactionServiceRequest::ListAll {
                limit,
                offset,
                response,
            } => {
                let result = self
                    .repository
                    .list_all(limit, offset)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
            TransactionServiceRequest::Dashboard { response } => {
                let result = self
                    .repository
                    .dashboard_stats()
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
        }
    }
}

pub struct TransactionService;

impl TransactionService {
    pub fn new() -> Self {
        TransactionService {}
    }
}

#[async_trait]
impl Service<TransactionServiceRequest, TransactionRequestHandler> for TransactionService {}
