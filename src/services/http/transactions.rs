use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::{dispatch, ApiError, ApiJson, AppState, AuthUser, WebhookCaller};
use crate::models::transactions::{DepositRequest, ProviderCallback, WithdrawalRequest};
use crate::services::transactions::TransactionServiceRequest;

pub async fn my_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let transactions = dispatch(&state.transaction_channel, |response| {
        TransactionServiceRequest::ListForUser {
            user_id: auth.user.id,
            response,
        }
    })
    .await?;

    Ok(Json(transactions))
}

pub async fn deposit(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(request): ApiJson<DepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let deposit = dispatch(&state.transaction_channel, |response| {
        TransactionServiceRequest::Deposit {
            user_id: auth.user.id,
            amount_in_cents: request.amount_in_cents,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(deposit)))
}

pub async fn withdraw(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(request): ApiJson<WithdrawalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let transaction = dispatch(&state.transaction_channel, |response| {
        TransactionServiceRequest::Withdraw {
            user_id: auth.user.id,
            amount_in_cents: request.amount_in_cents,
            destination: request.destination,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn provider_callback(
    State(state): State<AppState>,
    _caller: WebhookCaller,
    ApiJson(callback): ApiJson<ProviderCallback>,
) -> Result<impl IntoResponse, ApiError> {
    log::info!("Provider callback for {} ({}).", callback.id, callback.status);

    let transaction = dispatch(&state.transaction_channel, |response| {
        TransactionServiceRequest::ProviderCallback { callback, response }
    })
    .await?;

    Ok(Json(transaction))
}

#[cfg(test)]
mod tests {
    use super::super::{router, test_support::*};
    use crate::models::transactions::{Deposit, Transaction};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    fn callback_request(secret: &str) -> Request<Body> {
        Request::post("/payments/callback")
            .header("content-type", "application/json")
            .header("x-webhook-secret", secret)
            .body(Body::from(
                json!({ "invoiceId": "inv-9", "status": "PAID" }).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn callback_with_wrong_secret_is_rejected() {
        let (state, _queues) = state();

        let response = router(state)
            .oneshot(callback_request("guess"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unauthenticated_junk_callback_is_rejected_before_parsing() {
        let (state, _queues) = state();

        let response = router(state)
            .oneshot(
                Request::post("/payments/callback")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn malformed_callback_with_secret_is_a_bad_request() {
        let (state, _queues) = state();

        let response = router(state)
            .oneshot(
                Request::post("/payments/callback")
                    .header("content-type", "application/json")
                    .header("x-webhook-secret", WEBHOOK_SECRET)
                    .body(Body::from(json!({ "status": "PAID" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn callback_settles_through_service() {
        let (state, mut queues) = state();
        tokio::spawn(async move {
            if let Some(TransactionServiceRequest::ProviderCallback { callback, response }) =
                queues.transactions.recv().await
            {
                assert_eq!(callback.id, "inv-9");
                assert_eq!(callback.status, "PAID");
                let _ = response.send(Ok(Transaction {
                    id: "tx-1".to_string(),
                    user_id: "user-1".to_string(),
                    amount_in_cents: 10_000,
                    kind: "deposit".to_string(),
                    method: "payment_gateway".to_string(),
                    status: "completed".to_string(),
                    external_id: Some(callback.id),
                    created_at: chrono::NaiveDateTime::default(),
                    updated_at: chrono::NaiveDateTime::default(),
                }));
            }
        });

        let response = router(state)
            .oneshot(callback_request(WEBHOOK_SECRET))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "completed");
    }

    #[tokio::test]
    async fn deposit_returns_payment_url() {
        let (state, queues) = state();
        serve_sessions(queues.users, Some(user(false)));
        let mut transactions = queues.transactions;
        tokio::spawn(async move {
            if let Some(TransactionServiceRequest::Deposit {
                user_id,
                amount_in_cents,
                response,
            }) = transactions.recv().await
            {
                assert_eq!(user_id, "user-1");
                let _ = response.send(Ok(Deposit {
                    transaction_id: "tx-2".to_string(),
                    amount_in_cents,
                    payment_url: "https://pay.example.com/inv-2".to_string(),
                }));
            }
        });

        let response = router(state)
            .oneshot(
                Request::post("/me/deposits")
                    .header("authorization", "Bearer token")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "amount_in_cents": 2_500 }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["amount_in_cents"], 2_500);
        assert_eq!(body["payment_url"], "https://pay.example.com/inv-2");
    }
}
