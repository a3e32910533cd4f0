use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tower_sessions::Session;

use crate::auth;
use crate::currency::usd;
use crate::error::ApiError;
use crate::ledger::{self, LedgerError};
use crate::models::{QuoteRequest, QuoteResponse, TradeRequest, TradeResponse};
use crate::quotes;
use crate::AppState;

fn normalize_symbol(symbol: &str) -> Result<String, ApiError> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(ApiError::Validation("must provide a symbol".to_string()));
    }
    Ok(symbol)
}

/// Boundary validation for buy and sell: a non-empty symbol (normalized to
/// uppercase) and a share count of at least one.
fn validate_trade(trade: &TradeRequest) -> Result<(String, i64), ApiError> {
    let symbol = normalize_symbol(&trade.symbol)?;
    if trade.shares < 1 {
        return Err(ApiError::Validation(
            "number of shares must be a positive integer".to_string(),
        ));
    }
    Ok((symbol, trade.shares))
}

async fn reject_trade(err: LedgerError, session: &Session) -> ApiError {
    match err {
        // The session identity went stale under us.
        LedgerError::UnknownUser => {
            auth::expire_session(session).await;
            ApiError::Unauthorized
        }
        other => other.into(),
    }
}

/// Executes a purchase at the current quoted price.
#[axum::debug_handler]
pub async fn buy(
    State(state): State<AppState>,
    session: Session,
    Json(trade): Json<TradeRequest>,
) -> Result<(StatusCode, Json<TradeResponse>), ApiError> {
    let user_id = auth::current_user(&session).await?;
    let (symbol, shares) = validate_trade(&trade)?;

    let quote = quotes::lookup(&state.config.finnhub_api_key, &symbol)
        .await
        .map_err(|e| ApiError::from_quote(e, &symbol))?;

    let transaction = {
        let mut conn = state.pool.0.lock().await;
        ledger::buy(&mut conn, user_id, &quote.symbol, shares, quote.price)
    };
    let transaction = match transaction {
        Ok(t) => t,
        Err(e) => return Err(reject_trade(e, &session).await),
    };

    let cost = transaction.unit_price * shares;
    tracing::info!(user_id, symbol = %transaction.symbol, shares, cost, "buy executed");

    let message = format!(
        "Successfully bought {} share(s) of {} for {}!",
        shares,
        transaction.symbol,
        usd(cost)
    );

    Ok((StatusCode::CREATED, Json(TradeResponse { message, transaction })))
}

/// Executes a sale at the current quoted price.
pub async fn sell(
    State(state): State<AppState>,
    session: Session,
    Json(trade): Json<TradeRequest>,
) -> Result<(StatusCode, Json<TradeResponse>), ApiError> {
    let user_id = auth::current_user(&session).await?;
    let (symbol, shares) = validate_trade(&trade)?;

    // Report an unowned symbol before any quote traffic. The authoritative
    // check runs again inside the sale's transaction.
    {
        let conn = state.pool.0.lock().await;
        if ledger::cash_balance(&conn, user_id)?.is_none() {
            drop(conn);
            auth::expire_session(&session).await;
            return Err(ApiError::Unauthorized);
        }
        let available = ledger::shares_available(&conn, user_id, &symbol)?;
        if available <= 0 {
            return Err(LedgerError::NotOwned.into());
        }
        if shares > available {
            return Err(LedgerError::InsufficientShares.into());
        }
    }

    // The symbol is owned, so a failed lookup here is an inconsistency,
    // not a bad request.
    let quote = quotes::lookup(&state.config.finnhub_api_key, &symbol)
        .await
        .map_err(|e| ApiError::Inconsistent(format!("owned symbol '{symbol}' failed lookup: {e}")))?;

    let transaction = {
        let mut conn = state.pool.0.lock().await;
        ledger::sell(&mut conn, user_id, &quote.symbol, shares, quote.price)
    };
    let transaction = match transaction {
        Ok(t) => t,
        Err(e) => return Err(reject_trade(e, &session).await),
    };

    let proceeds = transaction.unit_price * shares;
    tracing::info!(user_id, symbol = %transaction.symbol, shares, proceeds, "sell executed");

    let message = format!(
        "Successfully sold {} share(s) of {} for {}!",
        shares,
        transaction.symbol,
        usd(proceeds)
    );

    Ok((StatusCode::CREATED, Json(TradeResponse { message, transaction })))
}

/// The symbols the user currently holds, i.e. what the sell form offers.
pub async fn sell_options(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<String>>, ApiError> {
    let user_id = auth::current_user(&session).await?;

    let conn = state.pool.0.lock().await;

    if ledger::cash_balance(&conn, user_id)?.is_none() {
        drop(conn);
        auth::expire_session(&session).await;
        return Err(ApiError::Unauthorized);
    }

    Ok(Json(ledger::owned_symbols(&conn, user_id)?))
}

/// Quotes a single symbol without trading it.
pub async fn quote(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, ApiError> {
    auth::current_user(&session).await?;

    let symbol = normalize_symbol(&req.symbol)?;
    let quote = quotes::lookup(&state.config.finnhub_api_key, &symbol)
        .await
        .map_err(|e| ApiError::from_quote(e, &symbol))?;

    Ok(Json(quote.into_response()))
}
