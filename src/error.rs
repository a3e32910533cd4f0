use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::quotes::QuoteError;

/// Everything a handler can fail with, mapped onto an HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input, reported before any state is touched.
    #[error("{0}")]
    Validation(String),

    /// A symbol the quote provider could not resolve.
    #[error("invalid symbol '{0}'")]
    UnknownSymbol(String),

    /// A well-formed request the ledger refused (funds, shares, ownership).
    #[error("{0}")]
    Rejected(String),

    /// Deliberately generic so login failures do not reveal which field was wrong.
    #[error("invalid username and/or password")]
    InvalidCredentials,

    #[error("please log in")]
    Unauthorized,

    /// A state the ledger should make impossible, e.g. an owned symbol that
    /// no longer resolves to a quote.
    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

impl ApiError {
    /// Collapses any quote-provider failure into an invalid-symbol rejection.
    /// Timeouts and transport errors are not-found-equivalent to the caller;
    /// the underlying cause is only logged.
    pub fn from_quote(err: QuoteError, symbol: &str) -> Self {
        if let QuoteError::Request(e) = &err {
            tracing::warn!(symbol, "quote lookup failed: {e}");
        }
        ApiError::UnknownSymbol(symbol.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::UnknownSymbol(_) | ApiError::Rejected(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Inconsistent(_) | ApiError::Database(_) | ApiError::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownUser => ApiError::Unauthorized,
            LedgerError::UsernameTaken => {
                ApiError::Validation("username already exists".to_string())
            }
            LedgerError::Db(e) => ApiError::Database(e),
            rejected => ApiError::Rejected(rejected.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!("request failed: {self}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        assert_eq!(
            ApiError::Validation("must provide a symbol".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UnknownSymbol("ZZZZ".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Rejected("too many shares".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn auth_errors_map_to_unauthorized() {
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn unknown_symbol_names_the_offender() {
        let err = ApiError::UnknownSymbol("ZZZZ".into());
        assert_eq!(err.to_string(), "invalid symbol 'ZZZZ'");
    }
}
