use crate::models::transactions::{
    self, DashboardStats, PaymentMethod, TransactionKind, TransactionStatus,
};
use crate::utils;

use sqlx::{PgPool, Postgres};

use super::RepositoryError;

#[derive(Clone)]
pub struct TransactionRepository {
    conn: PgPool,
}

impl TransactionRepository {
    pub fn new(conn: PgPool) -> Self {
        TransactionRepository { conn }
    }

    pub async fn new_deposit(
        &self,
        user_id: &str,
        amount_in_cents: i64,
        external_id: &str,
    ) -> Result<transactions::Transaction, RepositoryError> {
        let transaction = sqlx::query_as::<_, transactions::Transaction>(
            r#"
                INSERT INTO transactions (id, user_id, amount_in_cents, kind, method, status, external_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            "#,
        )
        .bind(utils::new_id())
        .bind(user_id)
        .bind(amount_in_cents)
        .bind(TransactionKind::Deposit.as_str())
        .bind(PaymentMethod::PaymentGateway.as_str())
        .bind(TransactionStatus::Pending.as_str())
        .bind(external_id)
        .fetch_one(&self.conn)
        .await?;

        Ok(transaction)
    }

    /// Reserves the withdrawn amount by debiting the balance up front.
    pub async fn new_withdrawal(
        &self,
        user_id: &str,
        amount_in_cents: i64,
    ) -> Result<transactions::Transaction, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let balance_in_cents: i64 =
            sqlx::query_scalar("SELECT balance_in_cents FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))?;

        if balance_in_cents < amount_in_cents {
            return Err(RepositoryError::InsufficientFunds {
                balance_in_cents,
                required_in_cents: amount_in_cents,
            });
        }

        adjust_balance(&mut tx, user_id, -amount_in_cents).await?;

        let transaction = sqlx::query_as::<_, transactions::Transaction>(
            r#"
                INSERT INTO transactions (id, user_id, amount_in_cents, kind, method, status)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
            "#,
        )
        .bind(utils::new_id())
        .bind(user_id)
        .bind(amount_in_cents)
        .bind(TransactionKind::Withdrawal.as_str())
        .bind(PaymentMethod::PaymentGateway.as_str())
        .bind(TransactionStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(transaction)
    }

    /// Stores the provider's payout id and, when the provider already reports a
    /// final status, settles the withdrawal in the same transaction.
    pub async fn record_payout(
        &self,
        id: &str,
        external_id: &str,
        status: Option<TransactionStatus>,
    ) -> Result<transactions::Transaction, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let transaction =
            sqlx::query_as::<_, transactions::Transaction>("SELECT * FROM transactions WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;

        let settled = apply_settlement(
            &mut tx,
            transaction,
            status.unwrap_or(TransactionStatus::Pending),
            Some(external_id),
        )
        .await?;
        tx.commit().await?;

        Ok(settled)
    }

    pub async fn settle(
        &self,
        id: &str,
        status: TransactionStatus,
    ) -> Result<transactions::Transaction, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let transaction =
            sqlx::query_as::<_, transactions::Transaction>("SELECT * FROM transactions WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;

        let settled = apply_settlement(&mut tx, transaction, status, None).await?;
        tx.commit().await?;

        Ok(settled)
    }

    /// Settles the transaction a provider callback refers to, found by the
    /// provider's id or, failing that, by the reference we sent with the request.
    pub async fn settle_external(
        &self,
        external_id: &str,
        reference: Option<&str>,
        status: TransactionStatus,
    ) -> Result<transactions::Transaction, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let transaction = sqlx::query_as::<_, transactions::Transaction>(
            r#"
                SELECT * FROM transactions
                WHERE external_id = $1 OR (external_id IS NULL AND id = $2)
                ORDER BY (external_id = $1) DESC NULLS LAST
                LIMIT 1
                FOR UPDATE
            "#,
        )
        .bind(external_id)
        .bind(reference)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", external_id)))?;

        let settled = apply_settlement(&mut tx, transaction, status, Some(external_id)).await?;
        tx.commit().await?;

        Ok(settled)
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<transactions::Transaction>, RepositoryError> {
        let transactions = sqlx::query_as::<_, transactions::Transaction>(
            "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC, id",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(transactions)
    }

    pub async fn list_all(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<transactions::Transaction>, RepositoryError> {
        let transactions = sqlx::query_as::<_, transactions::Transaction>(
            "SELECT * FROM transactions ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.conn)
        .await?;

        Ok(transactions)
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, RepositoryError> {
        let stats = sqlx::query_as::<_, DashboardStats>(
            r#"
                SELECT
                    (SELECT COUNT(*) FROM users) AS users,
                    (SELECT COUNT(*) FROM shops) AS shops,
                    (SELECT COUNT(*) FROM products) AS products,
                    (SELECT COALESCE(SUM(balance_in_cents), 0)::BIGINT FROM users)
                        AS total_balance_in_cents,
                    (SELECT COALESCE(SUM(amount_in_cents), 0)::BIGINT FROM transactions
                        WHERE kind = 'deposit' AND status = 'completed') AS deposits_in_cents,
                    (SELECT COALESCE(SUM(amount_in_cents), 0)::BIGINT FROM transactions
                        WHERE kind = 'withdrawal' AND status = 'completed') AS withdrawals_in_cents
            "#,
        )
        .fetch_one(&self.conn)
        .await?;

        Ok(stats)
    }
}

/// Moves a locked pending transaction to its final status. A completed deposit
/// credits the user, a failed withdrawal refunds it. Transactions that are no
/// longer pending keep their status; a missing `external_id` is filled in.
async fn apply_settlement(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    transaction: transactions::Transaction,
    status: TransactionStatus,
    external_id: Option<&str>,
) -> Result<transactions::Transaction, RepositoryError> {
    let settles = transaction.status == TransactionStatus::Pending.as_str()
        && status != TransactionStatus::Pending;
    let links_external = transaction.external_id.is_none() && external_id.is_some();

    if !settles && !links_external {
        return Ok(transaction);
    }

    if settles {
        let kind = transaction.kind.as_str();
        let credit = match status {
            TransactionStatus::Completed if kind == TransactionKind::Deposit.as_str() => {
                transaction.amount_in_cents
            }
            TransactionStatus::Failed if kind == TransactionKind::Withdrawal.as_str() => {
                transaction.amount_in_cents
            }
            _ => 0,
        };

        if credit != 0 {
            adjust_balance(tx, &transaction.user_id, credit).await?;
        }
    }

    let new_status = if settles {
        status.as_str()
    } else {
        transaction.status.as_str()
    };

    let updated = sqlx::query_as::<_, transactions::Transaction>(
        r#"
            UPDATE transactions
            SET status = $1, external_id = COALESCE(external_id, $2), updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING *
        "#,
    )
    .bind(new_status)
    .bind(external_id)
    .bind(&transaction.id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(updated)
}

/// Adds `delta` to a user's balance inside the caller's transaction.
pub(super) async fn adjust_balance(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    user_id: &str,
    delta: i64,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE users SET balance_in_cents = balance_in_cents + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
    )
    .bind(delta)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound(format!("user {}", user_id)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::repositories::fixtures;

    #[sqlx::test]
    async fn replayed_deposit_callback_credits_once(pool: PgPool) {
        let user = fixtures::user(&pool, "saver@example.com", None).await;
        let repository = TransactionRepository::new(pool.clone());
        repository.new_deposit(&user.id, 2_500, "inv-1").await.unwrap();

        let first = repository
            .settle_external("inv-1", None, TransactionStatus::Completed)
            .await
            .unwrap();
        let replay = repository
            .settle_external("inv-1", None, TransactionStatus::Completed)
            .await
            .unwrap();
        let late_failure = repository
            .settle_external("inv-1", None, TransactionStatus::Failed)
            .await
            .unwrap();

        assert_eq!(first.status, "completed");
        assert_eq!(replay.status, "completed");
        assert_eq!(late_failure.status, "completed");
        assert_eq!(fixtures::reload(&pool, &user.id).await.balance_in_cents, 2_500);
    }

    #[sqlx::test]
    async fn unknown_callback_id_is_not_found(pool: PgPool) {
        let result = TransactionRepository::new(pool)
            .settle_external("missing", Some("also-missing"), TransactionStatus::Completed)
            .await;

        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[sqlx::test]
    async fn failed_withdrawal_is_refunded(pool: PgPool) {
        let user = fixtures::user(&pool, "spender@example.com", None).await;
        fixtures::fund(&pool, &user.id, 10_000).await;
        let repository = TransactionRepository::new(pool.clone());

        let withdrawal = repository.new_withdrawal(&user.id, 7_000).await.unwrap();
        assert_eq!(fixtures::reload(&pool, &user.id).await.balance_in_cents, 3_000);

        let failed = repository
            .settle(&withdrawal.id, TransactionStatus::Failed)
            .await
            .unwrap();

        assert_eq!(failed.status, "failed");
        assert_eq!(fixtures::reload(&pool, &user.id).await.balance_in_cents, 10_000);
    }

    #[sqlx::test]
    async fn withdrawal_beyond_balance_is_refused(pool: PgPool) {
        let user = fixtures::user(&pool, "greedy@example.com", None).await;
        fixtures::fund(&pool, &user.id, 1_000).await;

        let result = TransactionRepository::new(pool.clone())
            .new_withdrawal(&user.id, 1_001)
            .await;

        assert!(matches!(result, Err(RepositoryError::InsufficientFunds { .. })));
        assert_eq!(fixtures::reload(&pool, &user.id).await.balance_in_cents, 1_000);
        assert!(fixtures::ledger(&pool, &user.id).await.is_empty());
    }

    #[sqlx::test]
    async fn unlinked_withdrawal_settles_by_reference(pool: PgPool) {
        let user = fixtures::user(&pool, "late@example.com", None).await;
        fixtures::fund(&pool, &user.id, 5_000).await;
        let repository = TransactionRepository::new(pool.clone());
        let withdrawal = repository.new_withdrawal(&user.id, 5_000).await.unwrap();
        assert!(withdrawal.external_id.is_none());

        let settled = repository
            .settle_external("payout-7", Some(&withdrawal.id), TransactionStatus::Failed)
            .await
            .unwrap();

        assert_eq!(settled.id, withdrawal.id);
        assert_eq!(settled.status, "failed");
        assert_eq!(settled.external_id.as_deref(), Some("payout-7"));
        assert_eq!(fixtures::reload(&pool, &user.id).await.balance_in_cents, 5_000);
    }

    #[sqlx::test]
    async fn recorded_payout_keeps_pending_until_final(pool: PgPool) {
        let user = fixtures::user(&pool, "payout@example.com", None).await;
        fixtures::fund(&pool, &user.id, 5_000).await;
        let repository = TransactionRepository::new(pool.clone());
        let withdrawal = repository.new_withdrawal(&user.id, 2_000).await.unwrap();

        let recorded = repository
            .record_payout(&withdrawal.id, "payout-8", None)
            .await
            .unwrap();
        assert_eq!(recorded.status, "pending");
        assert_eq!(recorded.external_id.as_deref(), Some("payout-8"));

        let settled = repository
            .settle_external("payout-8", None, TransactionStatus::Completed)
            .await
            .unwrap();
        assert_eq!(settled.status, "completed");
        assert_eq!(fixtures::reload(&pool, &user.id).await.balance_in_cents, 3_000);
    }
}
