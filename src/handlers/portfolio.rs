use axum::extract::State;
use axum::Json;
use tower_sessions::Session;

use crate::auth;
use crate::currency::usd;
use crate::error::ApiError;
use crate::ledger;
use crate::models::{HistoryEntry, Holding, PortfolioResponse};
use crate::quotes;
use crate::AppState;

/// Portfolio view: every active holding priced at its current quote, plus
/// cash and the combined total.
///
/// Valuation is all-or-nothing: if any held symbol fails to resolve, the
/// whole request fails naming that symbol rather than returning a partial
/// portfolio.
pub async fn index(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<PortfolioResponse>, ApiError> {
    let user_id = auth::current_user(&session).await?;

    // Read cash and positions before any quote traffic; the connection is
    // not held across network calls.
    let (cash, positions) = {
        let conn = state.pool.0.lock().await;
        (
            ledger::cash_balance(&conn, user_id)?,
            ledger::positions(&conn, user_id)?,
        )
    };

    let Some(cash) = cash else {
        auth::expire_session(&session).await;
        return Err(ApiError::Unauthorized);
    };

    let mut holdings = Vec::with_capacity(positions.len());
    let mut total = cash;

    for position in positions {
        let quote = quotes::lookup(&state.config.finnhub_api_key, &position.symbol)
            .await
            .map_err(|e| ApiError::from_quote(e, &position.symbol))?;

        let total_price = quote.price * position.shares;
        total += total_price;

        holdings.push(Holding {
            symbol: position.symbol,
            name: quote.name,
            shares: position.shares,
            unit_price: quote.price,
            unit_price_usd: usd(quote.price),
            total_price,
            total_price_usd: usd(total_price),
        });
    }

    Ok(Json(PortfolioResponse {
        cash,
        cash_usd: usd(cash),
        holdings,
        total,
        total_usd: usd(total),
    }))
}

/// Transaction history, newest first. Read-only.
pub async fn history(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let user_id = auth::current_user(&session).await?;

    let conn = state.pool.0.lock().await;

    if ledger::cash_balance(&conn, user_id)?.is_none() {
        drop(conn);
        auth::expire_session(&session).await;
        return Err(ApiError::Unauthorized);
    }

    Ok(Json(ledger::history(&conn, user_id)?))
}
