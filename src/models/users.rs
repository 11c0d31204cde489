use serde::{Deserialize, Serialize};

use super::referrals::ReferralTier;

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub balance_in_cents: i64,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub referral_rate_bp: i32,
    pub referral_count: i32,
    pub pending_bonus_in_cents: i64,
    pub mining_bot: bool,
    pub is_admin: bool,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: chrono::NaiveDateTime,
    pub expires_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
    pub referral_code: Option<String>,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), String> {
        validate_email(&self.email)?;
        validate_username(&self.username)?;

        if self.password.chars().count() < 8 {
            return Err("Password must be at least 8 characters long.".to_string());
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProfileUpdate {
    pub username: String,
}

/// Referral state written back to a referrer after a new sign-up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferrerUpdate {
    pub referral_count: i32,
    pub referral_rate_bp: i32,
    pub bonus_in_cents: i64,
}

impl ReferrerUpdate {
    pub fn after_signup(previous_count: i32) -> Self {
        let referral_count = previous_count + 1;
        let tier = ReferralTier::for_count(referral_count);
        let bonus_in_cents = if ReferralTier::crosses_bonus_threshold(previous_count, referral_count)
        {
            tier.bonus_in_cents
        } else {
            0
        };

        Self {
            referral_count,
            referral_rate_bp: tier.rate_bp,
            bonus_in_cents,
        }
    }
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let mut parts = email.trim().split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(format!("Invalid email address: {}.", email)),
    }
}

pub fn validate_username(username: &str) -> Result<(), String> {
    let length = username.trim().chars().count();
    if !(3..=32).contains(&length) {
        return Err("Username must be between 3 and 32 characters.".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, username: &str, password: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            referral_code: None,
        }
    }

    #[test]
    fn accepts_valid_registration() {
        assert!(new_user("miner@example.com", "miner", "hunter2hunter2")
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_bad_email() {
        assert!(new_user("miner.example.com", "miner", "hunter2hunter2")
            .validate()
            .is_err());
        assert!(new_user("a@b@example.com", "miner", "hunter2hunter2")
            .validate()
            .is_err());
        assert!(new_user("@example.com", "miner", "hunter2hunter2")
            .validate()
            .is_err());
    }

    #[test]
    fn rejects_short_password_and_username() {
        assert!(new_user("miner@example.com", "miner", "short").validate().is_err());
        assert!(new_user("miner@example.com", "mi", "hunter2hunter2")
            .validate()
            .is_err());
    }

    #[test]
    fn signup_bumps_referrer_tier() {
        let update = ReferrerUpdate::after_signup(4);
        assert_eq!(update.referral_count, 5);
        assert_eq!(update.referral_rate_bp, 150);
        assert_eq!(update.bonus_in_cents, 0);
    }

    #[test]
    fn fortieth_signup_grants_bonus_once() {
        let update = ReferrerUpdate::after_signup(39);
        assert_eq!(update.referral_rate_bp, 500);
        assert_eq!(update.bonus_in_cents, 100_000);

        let next = ReferrerUpdate::after_signup(40);
        assert_eq!(next.bonus_in_cents, 0);
    }
}
