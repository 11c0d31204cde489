use serde::{Deserialize, Serialize};

/// Rate applied to users below the first referral threshold.
pub const BASE_RATE_BP: i32 = 100;

/// Referral count at which the one-time bonus is granted.
pub const BONUS_THRESHOLD: i32 = 40;

// (minimum referrals, rate in basis points), highest threshold first.
const LADDER: [(i32, i32); 4] = [(40, 500), (20, 300), (10, 200), (5, 150)];

const THRESHOLD_BONUS_IN_CENTS: i64 = 100_000;

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct ReferralCount {
    pub id: String,
    pub user_id: String,
    pub referrer: String,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferralTier {
    pub rate_bp: i32,
    pub bonus_in_cents: i64,
}

impl ReferralTier {
    pub fn for_count(count: i32) -> Self {
        let rate_bp = LADDER
            .iter()
            .find(|(threshold, _)| count >= *threshold)
            .map(|(_, rate)| *rate)
            .unwrap_or(BASE_RATE_BP);

        let bonus_in_cents = if count >= BONUS_THRESHOLD {
            THRESHOLD_BONUS_IN_CENTS
        } else {
            0
        };

        Self {
            rate_bp,
            bonus_in_cents,
        }
    }

    pub fn crosses_bonus_threshold(previous: i32, current: i32) -> bool {
        previous < BONUS_THRESHOLD && current >= BONUS_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_thresholds() {
        assert_eq!(ReferralTier::for_count(0).rate_bp, BASE_RATE_BP);
        assert_eq!(ReferralTier::for_count(4).rate_bp, 100);
        assert_eq!(ReferralTier::for_count(5).rate_bp, 150);
        assert_eq!(ReferralTier::for_count(9).rate_bp, 150);
        assert_eq!(ReferralTier::for_count(10).rate_bp, 200);
        assert_eq!(ReferralTier::for_count(20).rate_bp, 300);
        assert_eq!(ReferralTier::for_count(39).rate_bp, 300);
        assert_eq!(ReferralTier::for_count(40).rate_bp, 500);
        assert_eq!(ReferralTier::for_count(1000).rate_bp, 500);
    }

    #[test]
    fn bonus_only_at_top_tier() {
        assert_eq!(ReferralTier::for_count(39).bonus_in_cents, 0);
        assert_eq!(ReferralTier::for_count(40).bonus_in_cents, 100_000);
    }

    #[test]
    fn threshold_crossing() {
        assert!(ReferralTier::crosses_bonus_threshold(39, 40));
        assert!(!ReferralTier::crosses_bonus_threshold(40, 41));
        assert!(!ReferralTier::crosses_bonus_threshold(10, 11));
    }
}
