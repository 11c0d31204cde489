use crate::models::rewards::{RewardAccrual, RewardCandidate, RewardSummary};
use crate::models::transactions::{PaymentMethod, TransactionKind, TransactionStatus};
use crate::utils;

use sqlx::{PgPool, Postgres};

use super::{transactions::adjust_balance, RepositoryError};

#[derive(Clone)]
pub struct RewardRepository {
    conn: PgPool,
}

impl RewardRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    /// Credits every user with the reward for the products they hold plus any
    /// pending referral bonus. The pass commits as a whole or not at all.
    pub async fn accrue_rewards(&self) -> Result<RewardSummary, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let candidates = sqlx::query_as::<_, RewardCandidate>(
            r#"
                SELECT u.id, u.referral_rate_bp, u.pending_bonus_in_cents,
                    COALESCE((
                        SELECT SUM(p.price_in_cents) FROM user_products up
                        JOIN products p ON p.id = up.product_id
                        WHERE up.user_id = u.id
                    ), 0)::BIGINT AS owned_value_in_cents
                FROM users u
                ORDER BY u.id
                FOR UPDATE
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut summary = RewardSummary::default();
        for candidate in &candidates {
            let accrual = RewardAccrual::from(candidate);
            if accrual.total() == 0 {
                continue;
            }

            adjust_balance(&mut tx, &candidate.id, accrual.total()).await?;

            if accrual.bonus_in_cents > 0 {
                sqlx::query(
                    "UPDATE users SET pending_bonus_in_cents = 0 WHERE id = $1",
                )
                .bind(&candidate.id)
                .execute(&mut *tx)
                .await?;

                record(&mut tx, &candidate.id, accrual.bonus_in_cents, TransactionKind::ReferralBonus)
                    .await?;
            }

            if accrual.reward_in_cents > 0 {
                record(&mut tx, &candidate.id, accrual.reward_in_cents, TransactionKind::Reward)
                    .await?;
            }

            summary.users_rewarded += 1;
            summary.total_paid_in_cents += accrual.total();
        }

        tx.commit().await?;

        Ok(summary)
    }
}

async fn record(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    user_id: &str,
    amount_in_cents: i64,
    kind: TransactionKind,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
            INSERT INTO transactions (id, user_id, amount_in_cents, kind, method, status)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(utils::new_id())
    .bind(user_id)
    .bind(amount_in_cents)
    .bind(kind.as_str())
    .bind(PaymentMethod::System.as_str())
    .bind(TransactionStatus::Completed.as_str())
    .execute(&mut **tx)
    .await?;

    Ok(())
}
