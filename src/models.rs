use serde::{Deserialize, Serialize};

use crate::currency::usd;

/// A registered user. `cash` is the balance in cents and is only ever
/// mutated by the trade executor.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub cash: i64,
}

/// What the API reveals about a user. The password hash never leaves the store.
#[derive(Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub cash: i64,
    pub cash_usd: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            cash_usd: usd(user.cash),
            cash: user.cash,
        }
    }
}

/// One row of the append-only ledger. `shares` is signed: positive for a
/// buy, negative for a sell.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Transaction {
    pub id: String,
    pub user_id: i64,
    pub symbol: String,
    pub shares: i64,
    pub unit_price: i64,
    pub timestamp: String,
}

/// Net share count for one symbol, derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub symbol: String,
    pub shares: i64,
}

/// An active holding priced with a live quote.
#[derive(Serialize, Deserialize, Debug)]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub unit_price: i64,
    pub unit_price_usd: String,
    pub total_price: i64,
    pub total_price_usd: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PortfolioResponse {
    pub cash: i64,
    pub cash_usd: String,
    pub holdings: Vec<Holding>,
    /// Cash plus the value of every holding at current prices.
    pub total: i64,
    pub total_usd: String,
}

/// One transaction as shown on the history page.
#[derive(Serialize, Deserialize, Debug)]
pub struct HistoryEntry {
    pub symbol: String,
    pub shares: i64,
    pub unit_price: i64,
    pub total_price: i64,
    pub total_price_usd: String,
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TradeRequest {
    pub symbol: String,
    pub shares: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TradeResponse {
    pub message: String,
    pub transaction: Transaction,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct QuoteRequest {
    pub symbol: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct QuoteResponse {
    pub symbol: String,
    pub name: String,
    pub price: i64,
    pub price_usd: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub confirmation: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}
