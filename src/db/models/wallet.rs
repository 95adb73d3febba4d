//! Wallet and ledger models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub id: String,
    pub user_id: String,
    pub balance: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Topup,
    RideDebit,
    RideRefund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Topup => "topup",
            Self::RideDebit => "ride_debit",
            Self::RideRefund => "ride_refund",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger line. `amount` is signed: debits are negative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WalletTransaction {
    pub id: String,
    pub wallet_id: String,
    pub kind: String,
    pub amount: f64,
    pub ride_id: Option<String>,
    pub balance_after: f64,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub balance: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopupResponse {
    pub message: String,
    pub balance: f64,
}
