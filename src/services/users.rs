use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::referrals::ReferralCount;
use crate::models::users::{self, Credentials, NewUser, ProfileUpdate};
use crate::repositories::{sessions::SessionRepository, users::UserRepository};
use crate::utils;

pub enum UserRequest {
    Register {
        new_user: NewUser,
        response: oneshot::Sender<Result<users::User, ServiceError>>,
    },
    Login {
        credentials: Credentials,
        response: oneshot::Sender<Result<users::Session, ServiceError>>,
    },
    Logout {
        token: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    Authenticate {
        token: String,
        response: oneshot::Sender<Result<users::User, ServiceError>>,
    },
    GetUser {
        id: String,
        response: oneshot::Sender<Result<users::User, ServiceError>>,
    },
    UpdateProfile {
        id: String,
        update: ProfileUpdate,
        response: oneshot::Sender<Result<users::User, ServiceError>>,
    },
    SetMiningBot {
        id: String,
        enabled: bool,
        response: oneshot::Sender<Result<users::User, ServiceError>>,
    },
    ListReferrals {
        id: String,
        response: oneshot::Sender<Result<Vec<ReferralCount>, ServiceError>>,
    },
    ListUsers {
        limit: i64,
        offset: i64,
        response: oneshot::Sender<Result<Vec<users::User>, ServiceError>>,
    },
    SetAdmin {
        id: String,
        is_admin: bool,
        response: oneshot::Sender<Result<users::User, ServiceError>>,
    },
    PurgeSessions,
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: UserRepository,
    sessions: SessionRepository,
    session_ttl: chrono::Duration,
}

impl UserRequestHandler {
    pub fn new(sql_conn: PgPool, session_ttl: chrono::Duration) -> Self {
        let repository = UserRepository::new(sql_conn.clone());
        let sessions = SessionRepository::new(sql_conn);

        UserRequestHandler {
            repository,
            sessions,
            session_ttl,
        }
    }

    async fn register(&self, new_user: NewUser) -> Result<users::User, ServiceError> {
        new_user.validate().map_err(ServiceError::Validation)?;

        let password = new_user.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || utils::hash_password(&password))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let user = self
            .repository
            .insert_user(
                &new_user.email.trim().to_lowercase(),
                new_user.username.trim(),
                &password_hash,
                new_user.referral_code.as_deref(),
            )
            .await?;

        log::info!("Registered user {}.", user.id);
        Ok(user)
    }

    async fn login(&self, credentials: Credentials) -> Result<users::Session, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid email or password.".to_string());

        let user = self
            .repository
            .get_user_by_email(&credentials.email.trim().to_lowercase())
            .await?
            .ok_or_else(invalid)?;

        let password_hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || {
            utils::verify_password(&credentials.password, &password_hash)
        })
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?;

        if !valid {
            log::warn!("Failed login for user {}.", user.id);
            return Err(invalid());
        }

        let session = self
            .sessions
            .create_session(&user.id, self.session_ttl)
            .await?;

        Ok(session)
    }

    async fn authenticate(&self, token: &str) -> Result<users::User, ServiceError> {
        self.sessions
            .get_user_by_token(token)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Invalid or expired session.".to_string()))
    }

    async fn get_user(&self, id: &str) -> Result<users::User, ServiceError> {
        self.repository
            .get_user_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", id)))
    }

    async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<users::User, ServiceError> {
        users::validate_username(&update.username).map_err(ServiceError::Validation)?;

        Ok(self
            .repository
            .update_username(id, update.username.trim())
            .await?)
    }

    async fn list_referrals(&self, id: &str) -> Result<Vec<ReferralCount>, ServiceError> {
        let user = self.get_user(id).await?;

        Ok(self.repository.list_referrals(&user.referral_code).await?)
    }

    async fn purge_sessions(&self) {
        match self.sessions.purge_expired().await {
            Ok(purged) => log::info!("Purged {} expired sessions.", purged),
            Err(e) => log::error!("Could not purge sessions: {}", e),
        }
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Register { new_user, response } => {
                let user = self.register(new_user).await;
                let _ = response.send(user);
            }
            UserRequest::Login {
                credentials,
                response,
            } => {
                let session = self.login(credentials).await;
                let _ = response.send(session);
            }
            UserRequest::Logout { token, response } => {
                let result = self
                    .sessions
                    .delete_session(&token)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(result);
            }
            UserRequest::Authenticate { token, response } => {
                let user = self.authenticate(&token).await;
                let _ = response.send(user);
            }
            UserRequest::GetUser { id, response } => {
                let user = self.get_user(&id).await;
                let _ = response.send(user);
            }
            UserRequest::UpdateProfile {
                id,
                update,
                response,
            } => {
                let user = self.update_profile(&id, update).await;
                let _ = response.send(user);
            }
            UserRequest::SetMiningBot {
                id,
                enabled,
                response,
            } => {
                let user = self
                    .repository
                    .set_mining_bot(&id, enabled)
                    .await
                    .map_err(ServiceError::from);
                if user.is_ok() {
                    log::info!("Mining bot for {} set to {}.", id, enabled);
                }
                let _ = response.send(user);
            }
            UserRequest::ListReferrals { id, response } => {
                let referrals = self.list_referrals(&id).await;
                let _ = response.send(referrals);
            }
            UserRequest::ListUsers {
                limit,
                offset,
                response,
            } => {
                let users = self
                    .repository
                    .list_users(limit, offset)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(users);
            }
            UserRequest::SetAdmin {
                id,
                is_admin,
                response,
            } => {
                let user = self
                    .repository
                    .set_admin(&id, is_admin)
                    .await
                    .map_err(ServiceError::from);
                let _ = response.send(user);
            }
            UserRequest::PurgeSessions => self.purge_sessions().await,
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
