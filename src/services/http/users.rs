use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use super::{dispatch, ApiError, ApiJson, AppState, AuthUser};
use crate::models::users::{Credentials, NewUser, ProfileUpdate};
use crate::services::users::UserRequest;

#[derive(Deserialize)]
pub struct MiningBotToggle {
    enabled: bool,
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(new_user): ApiJson<NewUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = dispatch(&state.user_channel, |response| UserRequest::Register {
        new_user,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let session = dispatch(&state.user_channel, |response| UserRequest::Login {
        credentials,
        response,
    })
    .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "token": session.token,
            "user_id": session.user_id,
            "expires_at": session.expires_at
        })),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    dispatch(&state.user_channel, |response| UserRequest::Logout {
        token: auth.token,
        response,
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(auth: AuthUser) -> impl IntoResponse {
    Json(auth.user)
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let user = dispatch(&state.user_channel, |response| UserRequest::UpdateProfile {
        id: auth.user.id,
        update,
        response,
    })
    .await?;

    Ok(Json(user))
}

pub async fn set_mining_bot(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(toggle): ApiJson<MiningBotToggle>,
) -> Result<impl IntoResponse, ApiError> {
    let user = dispatch(&state.user_channel, |response| UserRequest::SetMiningBot {
        id: auth.user.id,
        enabled: toggle.enabled,
        response,
    })
    .await?;

    Ok(Json(json!({ "user_id": user.id, "mining_bot": user.mining_bot })))
}

pub async fn referrals(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let referrals = dispatch(&state.user_channel, |response| UserRequest::ListReferrals {
        id: auth.user.id.clone(),
        response,
    })
    .await?;

    Ok(Json(json!({
        "referral_code": auth.user.referral_code,
        "referral_count": auth.user.referral_count,
        "referral_rate_bp": auth.user.referral_rate_bp,
        "pending_bonus_in_cents": auth.user.pending_bonus_in_cents,
        "referrals": referrals
    })))
}

#[cfg(test)]
mod tests {
    use super::super::{router, test_support::*};
    use crate::services::ServiceError;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn register_returns_created_user_without_hash() {
        let (state, mut queues) = state();
        tokio::spawn(async move {
            if let Some(UserRequest::Register { new_user, response }) = queues.users.recv().await {
                let mut created = user(false);
                created.email = new_user.email;
                let _ = response.send(Ok(created));
            }
        });

        let response = router(state)
            .oneshot(json_request(
                "POST",
                "/auth/register",
                json!({
                    "email": "new@example.com",
                    "username": "newbie",
                    "password": "hunter2hunter2",
                    "referral_code": "ABCD1234"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["email"], "new@example.com");
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn register_validation_errors_are_bad_requests() {
        let (state, mut queues) = state();
        tokio::spawn(async move {
            if let Some(UserRequest::Register { response, .. }) = queues.users.recv().await {
                let _ = response.send(Err(ServiceError::Validation(
                    "Password must be at least 8 characters long.".to_string(),
                )));
            }
        });

        let response = router(state)
            .oneshot(json_request(
                "POST",
                "/auth/register",
                json!({ "email": "a@b.io", "username": "abc", "password": "x" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn malformed_registration_body_uses_error_envelope() {
        let (state, _queues) = state();

        let response = router(state)
            .oneshot(json_request(
                "POST",
                "/auth/register",
                json!({ "email": "a@b.io" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation");
        assert!(body["details"]
            .as_str()
            .is_some_and(|details| details.contains("username")));
    }

    #[tokio::test]
    async fn login_returns_token() {
        let (state, mut queues) = state();
        tokio::spawn(async move {
            if let Some(UserRequest::Login { response, .. }) = queues.users.recv().await {
                let _ = response.send(Ok(crate::models::users::Session {
                    token: "tok".to_string(),
                    user_id: "user-1".to_string(),
                    created_at: chrono::NaiveDateTime::default(),
                    expires_at: chrono::NaiveDateTime::default(),
                }));
            }
        });

        let response = router(state)
            .oneshot(json_request(
                "POST",
                "/auth/login",
                json!({ "email": "miner@example.com", "password": "hunter2hunter2" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["token"], "tok");
    }

    #[tokio::test]
    async fn me_returns_authenticated_user() {
        let (state, queues) = state();
        serve_sessions(queues.users, Some(user(false)));

        let response = router(state)
            .oneshot(
                Request::get("/me")
                    .header("authorization", "Bearer token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["username"], "miner");
        assert_eq!(body["balance_in_cents"], 5_000);
    }
}
