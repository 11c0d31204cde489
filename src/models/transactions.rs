use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub amount_in_cents: i64,
    pub kind: String,
    pub method: String,
    pub status: String,
    pub external_id: Option<String>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Purchase,
    Reward,
    ReferralBonus,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Purchase => "purchase",
            TransactionKind::Reward => "reward",
            TransactionKind::ReferralBonus => "referral_bonus",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentMethod {
    PaymentGateway,
    Balance,
    System,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::PaymentGateway => "payment_gateway",
            PaymentMethod::Balance => "balance",
            PaymentMethod::System => "system",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Maps a payment provider status onto a final ledger status.
    /// `None` means the provider has not settled the payment yet.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status.to_ascii_lowercase().as_str() {
            "paid" | "completed" | "settled" => Some(TransactionStatus::Completed),
            "failed" | "expired" | "cancelled" | "canceled" | "rejected" => {
                Some(TransactionStatus::Failed)
            }
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DepositRequest {
    pub amount_in_cents: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub amount_in_cents: i64,
    pub destination: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Deposit {
    pub transaction_id: String,
    pub amount_in_cents: i64,
    pub payment_url: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInvoice {
    pub id: String,
    pub payment_url: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPayout {
    pub id: String,
    pub status: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCallback {
    #[serde(alias = "invoiceId", alias = "payoutId")]
    pub id: String,
    pub status: String,
    /// Our transaction id, echoed back from the invoice or payout request.
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, sqlx::FromRow)]
pub struct DashboardStats {
    pub users: i64,
    pub shops: i64,
    pub products: i64,
    pub total_balance_in_cents: i64,
    pub deposits_in_cents: i64,
    pub withdrawals_in_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses() {
        assert_eq!(
            TransactionStatus::from_provider("PAID"),
            Some(TransactionStatus::Completed)
        );
        assert_eq!(
            TransactionStatus::from_provider("expired"),
            Some(TransactionStatus::Failed)
        );
        assert_eq!(TransactionStatus::from_provider("processing"), None);
    }

    #[test]
    fn callback_accepts_invoice_alias() {
        let callback: ProviderCallback =
            serde_json::from_str(r#"{"invoiceId": "inv-1", "status": "paid"}"#).unwrap();
        assert_eq!(callback.id, "inv-1");
    }
}
