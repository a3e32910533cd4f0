use std::env;

use thiserror::Error;

/// New accounts start with $10,000.00 unless configured otherwise.
pub const DEFAULT_STARTING_CASH: i64 = 10_000_00;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Runtime configuration, collected from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: String,
    pub sessions_path: String,
    pub frontend_url: String,
    pub finnhub_api_key: String,
    /// Cash balance granted to newly registered users, in cents.
    pub starting_cash: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let finnhub_api_key =
            env::var("FINNHUB_API_KEY").map_err(|_| ConfigError::Missing("FINNHUB_API_KEY"))?;

        let starting_cash = match env::var("STARTING_CASH_CENTS") {
            Ok(raw) => {
                let cents = raw
                    .parse::<i64>()
                    .map_err(|_| ConfigError::Invalid("STARTING_CASH_CENTS", raw.clone()))?;
                if cents < 0 {
                    return Err(ConfigError::Invalid("STARTING_CASH_CENTS", raw));
                }
                cents
            }
            Err(_) => DEFAULT_STARTING_CASH,
        };

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "finance.db".to_string()),
            sessions_path: env::var("SESSIONS_PATH").unwrap_or_else(|_| "sessions.db".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            finnhub_api_key,
            starting_cash,
        })
    }
}
