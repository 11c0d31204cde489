use serde::Serialize;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct RewardCandidate {
    pub id: String,
    pub referral_rate_bp: i32,
    pub pending_bonus_in_cents: i64,
    pub owned_value_in_cents: i64,
}

/// Amounts credited to a single user by one accrual pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardAccrual {
    pub reward_in_cents: i64,
    pub bonus_in_cents: i64,
}

impl RewardAccrual {
    pub fn compute(owned_value_in_cents: i64, rate_bp: i32, pending_bonus_in_cents: i64) -> Self {
        let reward_in_cents = owned_value_in_cents.max(0) * i64::from(rate_bp.max(0)) / 10_000;

        Self {
            reward_in_cents,
            bonus_in_cents: pending_bonus_in_cents.max(0),
        }
    }

    pub fn total(&self) -> i64 {
        self.reward_in_cents + self.bonus_in_cents
    }
}

impl From<&RewardCandidate> for RewardAccrual {
    fn from(candidate: &RewardCandidate) -> Self {
        Self::compute(
            candidate.owned_value_in_cents,
            candidate.referral_rate_bp,
            candidate.pending_bonus_in_cents,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RewardSummary {
    pub users_rewarded: u64,
    pub total_paid_in_cents: i64,
}
