use axum::{extract::State, Json};
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{TopupResponse, User, WalletResponse, WalletTransaction};
use crate::AppState;

pub async fn my_wallet(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state.wallets.wallet(&user).await?;
    Ok(Json(WalletResponse {
        balance: wallet.balance,
    }))
}

/// Credit the configured top-up amount
pub async fn topup(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<TopupResponse>, ApiError> {
    let wallet = state.wallets.topup(&user).await?;
    Ok(Json(TopupResponse {
        message: "Wallet topped up".to_string(),
        balance: wallet.balance,
    }))
}

pub async fn transactions(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<WalletTransaction>>, ApiError> {
    Ok(Json(state.wallets.transactions(&user).await?))
}
