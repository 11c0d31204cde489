pub mod payments;
pub mod price;
pub mod products;
pub mod rewards;
pub mod sessions;
pub mod shops;
pub mod transactions;
pub mod users;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Insufficient funds: balance {balance_in_cents}, required {required_in_cents}")]
    InsufficientFunds {
        balance_in_cents: i64,
        required_in_cents: i64,
    },
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(e),
        }
    }
}
