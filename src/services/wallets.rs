//! Wallet balances and the ledger behind them.
//!
//! The free functions take a connection so ride operations can run them
//! inside their own transaction; `WalletService` wraps them for the
//! standalone wallet endpoints.

use sqlx::SqliteConnection;
use tracing::info;

use super::error::{ServiceError, ServiceResult};
use crate::db::{begin_write, finish, new_id, now_timestamp, round_cents, TransactionKind, User, Wallet, WalletTransaction};
use crate::DbPool;

/// Return the user's wallet, creating an empty one on first access
pub async fn get_or_create(conn: &mut SqliteConnection, user_id: &str) -> ServiceResult<Wallet> {
    let now = now_timestamp();
    sqlx::query(
        "INSERT INTO wallets (id, user_id, balance, created_at, updated_at) VALUES (?, ?, 0, ?, ?) ON CONFLICT(user_id) DO NOTHING",
    )
    .bind(new_id())
    .bind(user_id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(wallet)
}

async fn record(
    conn: &mut SqliteConnection,
    wallet: &Wallet,
    kind: TransactionKind,
    amount: f64,
    ride_id: Option<&str>,
) -> ServiceResult<()> {
    sqlx::query(
        "INSERT INTO wallet_transactions (id, wallet_id, kind, amount, ride_id, balance_after, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new_id())
    .bind(&wallet.id)
    .bind(kind.as_str())
    .bind(amount)
    .bind(ride_id)
    .bind(wallet.balance)
    .bind(now_timestamp())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Add `amount` to the user's balance and log it under `kind`
pub async fn credit(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: f64,
    kind: TransactionKind,
    ride_id: Option<&str>,
) -> ServiceResult<Wallet> {
    let amount = round_cents(amount);
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ServiceError::validation("amount", "Amount must be positive"));
    }

    get_or_create(conn, user_id).await?;
    sqlx::query(
        "UPDATE wallets SET balance = ROUND(balance + ?, 2), updated_at = ? WHERE user_id = ?",
    )
    .bind(amount)
    .bind(now_timestamp())
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    let wallet = get_or_create(conn, user_id).await?;
    record(conn, &wallet, kind, amount, ride_id).await?;
    Ok(wallet)
}

/// Take `amount` from the user's balance for a ride.
///
/// The balance check and the subtraction are one conditional update, so the
/// balance can never go negative and a failed debit changes nothing.
pub async fn debit(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: f64,
    ride_id: &str,
) -> ServiceResult<Wallet> {
    let amount = round_cents(amount);
    if !amount.is_finite() || amount < 0.0 {
        return Err(ServiceError::validation("amount", "Amount must not be negative"));
    }

    let current = get_or_create(conn, user_id).await?;
    let result = sqlx::query(
        "UPDATE wallets SET balance = ROUND(balance - ?, 2), updated_at = ? WHERE user_id = ? AND balance >= ?",
    )
    .bind(amount)
    .bind(now_timestamp())
    .bind(user_id)
    .bind(amount)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::InsufficientFunds {
            balance: current.balance,
            required: amount,
        });
    }

    let wallet = get_or_create(conn, user_id).await?;
    record(conn, &wallet, TransactionKind::RideDebit, -amount, Some(ride_id)).await?;
    Ok(wallet)
}

pub async fn transactions(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> ServiceResult<Vec<WalletTransaction>> {
    let wallet = get_or_create(conn, user_id).await?;
    let entries = sqlx::query_as::<_, WalletTransaction>(
        "SELECT * FROM wallet_transactions WHERE wallet_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(&wallet.id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(entries)
}

#[derive(Debug, Clone)]
pub struct WalletService {
    db: DbPool,
    topup_amount: f64,
}

impl WalletService {
    pub fn new(db: DbPool, topup_amount: f64) -> Self {
        Self { db, topup_amount }
    }

    pub async fn wallet(&self, user: &User) -> ServiceResult<Wallet> {
        let mut conn = self.db.acquire().await?;
        get_or_create(&mut conn, &user.id).await
    }

    /// Credit the fixed top-up amount
    pub async fn topup(&self, user: &User) -> ServiceResult<Wallet> {
        let mut tx = begin_write(&self.db).await?;
        let result = credit(&mut tx, &user.id, self.topup_amount, TransactionKind::Topup, None).await;
        let wallet = finish(tx, result).await?;

        info!(user_id = %user.id, amount = self.topup_amount, balance = wallet.balance, "Wallet topped up");
        Ok(wallet)
    }

    pub async fn transactions(&self, user: &User) -> ServiceResult<Vec<WalletTransaction>> {
        let mut conn = self.db.acquire().await?;
        transactions(&mut conn, &user.id).await
    }
}
