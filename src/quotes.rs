use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::currency::usd;
use crate::models::QuoteResponse;

/// A point-in-time lookup result for a symbol. `price` is in cents.
#[derive(Debug, Clone)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: i64,
}

impl Quote {
    pub fn into_response(self) -> QuoteResponse {
        QuoteResponse {
            price_usd: usd(self.price),
            symbol: self.symbol,
            name: self.name,
            price: self.price,
        }
    }
}

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("unknown symbol '{0}'")]
    NotFound(String),

    #[error("quote request failed: {0}")]
    Request(#[from] reqwest::Error),
}

// One shared client for all lookups. Requests that outlive the timeout are
// surfaced as errors, never left hanging.
lazy_static::lazy_static! {
    static ref CLIENT: reqwest::Client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client");
}

/// Finnhub's quote payload; `c` is the current price in dollars.
#[derive(Deserialize)]
struct FinnhubQuote {
    c: f64,
}

/// Resolves a symbol to its current price and company name, or reports it
/// unknown. Every call re-queries the provider; nothing is cached.
pub async fn lookup(api_key: &str, symbol: &str) -> Result<Quote, QuoteError> {
    let price = fetch_price(api_key, symbol).await?;
    let name = fetch_name(api_key, symbol).await?;

    Ok(Quote {
        symbol: symbol.to_string(),
        name,
        price,
    })
}

async fn fetch_price(api_key: &str, symbol: &str) -> Result<i64, QuoteError> {
    let url = format!(
        "https://finnhub.io/api/v1/quote?symbol={}&token={}",
        symbol, api_key
    );

    let response = CLIENT.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(QuoteError::NotFound(symbol.to_string()));
    }

    let quote: FinnhubQuote = response.json().await?;

    // Finnhub reports unknown symbols as a successful response with price 0.
    if quote.c <= 0.0 {
        return Err(QuoteError::NotFound(symbol.to_string()));
    }

    Ok((quote.c * 100.0).round() as i64)
}

async fn fetch_name(api_key: &str, symbol: &str) -> Result<String, QuoteError> {
    let url = format!(
        "https://finnhub.io/api/v1/stock/profile2?symbol={}&token={}",
        symbol, api_key
    );

    let response = CLIENT.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(QuoteError::NotFound(symbol.to_string()));
    }

    let profile: serde_json::Value = response.json().await?;
    match profile["name"].as_str() {
        Some(name) => Ok(name.to_string()),
        None => Err(QuoteError::NotFound(symbol.to_string())),
    }
}
