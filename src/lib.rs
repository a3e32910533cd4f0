// src/lib.rs
pub mod auth;
pub mod config;
pub mod currency;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod quotes;

// Re-export commonly used items
pub use config::Config;
pub use db::DatabasePool;
pub use error::ApiError;

use std::sync::Arc;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DatabasePool,
    pub config: Arc<Config>,
}
