use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::Connection;
use tower_sessions::Session;

use crate::error::ApiError;
use crate::ledger;
use crate::models::{LoginRequest, RegisterRequest, User, UserResponse};
use crate::AppState;

/// Session key holding the authenticated user's id.
pub const SESSION_USER_KEY: &str = "user_id";

/// Resolves the session to a user id, or rejects the request.
pub async fn current_user(session: &Session) -> Result<i64, ApiError> {
    match session.get::<i64>(SESSION_USER_KEY).await? {
        Some(id) => Ok(id),
        None => Err(ApiError::Unauthorized),
    }
}

/// Drops a session whose identity no longer resolves to a user row, so the
/// client is forced back through login.
pub async fn expire_session(session: &Session) {
    if let Err(e) = session.flush().await {
        tracing::warn!("failed to clear session: {e}");
    }
}

fn validate_registration(req: &RegisterRequest) -> Result<&str, ApiError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::Validation("must provide username".to_string()));
    }
    if req.password.is_empty() || req.confirmation.is_empty() {
        return Err(ApiError::Validation(
            "must provide password two times".to_string(),
        ));
    }
    if req.password != req.confirmation {
        return Err(ApiError::Validation("passwords do not match".to_string()));
    }
    Ok(username)
}

/// Checks a username/password pair against the store. Unknown usernames and
/// wrong passwords fail identically.
pub fn authenticate(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<User, ApiError> {
    let Some(user) = ledger::user_by_username(conn, username)? else {
        return Err(ApiError::InvalidCredentials);
    };

    let valid = bcrypt::verify(password, &user.password_hash)
        .map_err(|e| ApiError::Inconsistent(format!("password verification failed: {e}")))?;
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    Ok(user)
}

/// Creates an account and logs it in. The username pre-check gives a clean
/// error message; the UNIQUE constraint backstops a racing registration.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let username = validate_registration(&req)?.to_string();

    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Inconsistent(format!("password hashing failed: {e}")))?;

    let user = {
        let conn = state.pool.0.lock().await;
        if ledger::user_by_username(&conn, &username)?.is_some() {
            return Err(ApiError::Validation("username already exists".to_string()));
        }
        ledger::create_user(&conn, &username, &password_hash, state.config.starting_cash)?
    };

    session.insert(SESSION_USER_KEY, user.id).await?;
    tracing::info!(user_id = user.id, username = %user.username, "registered");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    // Forget any identity the session already carries.
    session.flush().await?;

    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::Validation("must provide username".to_string()));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("must provide password".to_string()));
    }

    let user = {
        let conn = state.pool.0.lock().await;
        authenticate(&conn, username, &req.password)?
    };

    session.insert(SESSION_USER_KEY, user.id).await?;
    tracing::info!(user_id = user.id, username = %user.username, "logged in");

    Ok(Json(UserResponse::from(user)))
}

/// Clears the session identity unconditionally.
pub async fn logout(session: Session) -> Result<StatusCode, ApiError> {
    session.flush().await?;
    Ok(StatusCode::NO_CONTENT)
}
