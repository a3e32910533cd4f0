//! The append-only trade ledger.
//!
//! Holdings are never stored. A user's position in a symbol is the signed
//! sum of their transaction rows for it, so every state the ledger can
//! reach is derivable from the transaction log alone. Buys and sells run
//! their check-then-write sequence inside a single database transaction;
//! a rejected trade leaves both tables untouched.

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::currency::usd;
use crate::models::{HistoryEntry, Position, Transaction, User};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The session points at a user row that no longer exists.
    #[error("account not found")]
    UnknownUser,

    #[error("username already exists")]
    UsernameTaken,

    #[error("your balance is too low")]
    InsufficientFunds,

    #[error("symbol is not owned")]
    NotOwned,

    #[error("too many shares")]
    InsufficientShares,

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

/// Creates a user with the given starting balance. The username must be
/// unique (exact, case-sensitive match).
pub fn create_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    starting_cash: i64,
) -> Result<User, LedgerError> {
    conn.execute(
        "INSERT INTO users (username, password_hash, cash) VALUES (?1, ?2, ?3)",
        params![username, password_hash, starting_cash],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            LedgerError::UsernameTaken
        }
        other => LedgerError::Db(other),
    })?;

    Ok(User {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        cash: starting_cash,
    })
}

pub fn user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, LedgerError> {
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, cash FROM users WHERE username = ?1",
            [username],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    cash: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(user)
}

/// Current cash balance in cents, or `None` when the user row is gone.
pub fn cash_balance(conn: &Connection, user_id: i64) -> Result<Option<i64>, LedgerError> {
    let cash = conn
        .query_row("SELECT cash FROM users WHERE id = ?1", [user_id], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(cash)
}

/// Active positions: symbols whose signed share sum is positive, ordered
/// by symbol.
pub fn positions(conn: &Connection, user_id: i64) -> Result<Vec<Position>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT symbol, SUM(shares) AS total_shares
         FROM transactions
         WHERE user_id = ?1
         GROUP BY symbol
         HAVING total_shares > 0
         ORDER BY symbol",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(Position {
                symbol: row.get(0)?,
                shares: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Net shares held for one symbol; zero when the user never traded it.
pub fn shares_available(
    conn: &Connection,
    user_id: i64,
    symbol: &str,
) -> Result<i64, LedgerError> {
    let sum: Option<i64> = conn.query_row(
        "SELECT SUM(shares) FROM transactions WHERE user_id = ?1 AND symbol = ?2",
        params![user_id, symbol],
        |row| row.get(0),
    )?;

    Ok(sum.unwrap_or(0))
}

/// Symbols the user can currently sell.
pub fn owned_symbols(conn: &Connection, user_id: i64) -> Result<Vec<String>, LedgerError> {
    Ok(positions(conn, user_id)?
        .into_iter()
        .map(|p| p.symbol)
        .collect())
}

/// Every transaction for the user, newest first, with the absolute trade
/// value precomputed for display.
pub fn history(conn: &Connection, user_id: i64) -> Result<Vec<HistoryEntry>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT symbol, shares, unit_price, ABS(shares * unit_price) AS total_price, timestamp
         FROM transactions
         WHERE user_id = ?1
         ORDER BY timestamp DESC, rowid DESC",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(HistoryEntry {
                symbol: row.get(0)?,
                shares: row.get(1)?,
                unit_price: row.get(2)?,
                total_price: row.get(3)?,
                total_price_usd: usd(row.get(3)?),
                timestamp: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Atomically executes a purchase: debits `shares * unit_price` from the
/// user's cash and appends a positive transaction row. Rejection at any
/// step rolls the whole unit back.
pub fn buy(
    conn: &mut Connection,
    user_id: i64,
    symbol: &str,
    shares: i64,
    unit_price: i64,
) -> Result<Transaction, LedgerError> {
    let cost = unit_price
        .checked_mul(shares)
        .ok_or(LedgerError::InsufficientFunds)?;

    let tx = conn.transaction()?;

    let cash: i64 = tx
        .query_row("SELECT cash FROM users WHERE id = ?1", [user_id], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or(LedgerError::UnknownUser)?;

    if cash < cost {
        return Err(LedgerError::InsufficientFunds);
    }

    tx.execute(
        "UPDATE users SET cash = cash - ?1 WHERE id = ?2",
        params![cost, user_id],
    )?;
    let record = append_transaction(&tx, user_id, symbol, shares, unit_price)?;

    tx.commit()?;
    Ok(record)
}

/// Atomically executes a sale: verifies the user holds enough shares,
/// appends a negative transaction row, and credits the proceeds.
pub fn sell(
    conn: &mut Connection,
    user_id: i64,
    symbol: &str,
    shares: i64,
    unit_price: i64,
) -> Result<Transaction, LedgerError> {
    let proceeds = unit_price
        .checked_mul(shares)
        .ok_or(LedgerError::InsufficientShares)?;

    let tx = conn.transaction()?;

    tx.query_row("SELECT id FROM users WHERE id = ?1", [user_id], |row| {
        row.get::<_, i64>(0)
    })
    .optional()?
    .ok_or(LedgerError::UnknownUser)?;

    let available = shares_available(&tx, user_id, symbol)?;

    if available <= 0 {
        return Err(LedgerError::NotOwned);
    }
    if shares > available {
        return Err(LedgerError::InsufficientShares);
    }

    let record = append_transaction(&tx, user_id, symbol, -shares, unit_price)?;
    tx.execute(
        "UPDATE users SET cash = cash + ?1 WHERE id = ?2",
        params![proceeds, user_id],
    )?;

    tx.commit()?;
    Ok(record)
}

fn append_transaction(
    tx: &rusqlite::Transaction,
    user_id: i64,
    symbol: &str,
    shares: i64,
    unit_price: i64,
) -> Result<Transaction, LedgerError> {
    let id = uuid::Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO transactions (id, user_id, symbol, shares, unit_price)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user_id, symbol, shares, unit_price],
    )?;

    Ok(Transaction {
        id,
        user_id,
        symbol: symbol.to_string(),
        shares,
        unit_price,
        timestamp: chrono::Local::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn
    }

    fn seed_user(conn: &Connection, cash: i64) -> i64 {
        create_user(conn, "alice", "not-a-real-hash", cash)
            .unwrap()
            .id
    }

    fn transaction_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn buy_debits_cash_and_appends_a_row() {
        let mut conn = test_conn();
        let user = seed_user(&conn, 10_000_00);

        let record = buy(&mut conn, user, "ACME", 10, 100_00).unwrap();
        assert_eq!(record.shares, 10);
        assert_eq!(record.unit_price, 100_00);

        assert_eq!(cash_balance(&conn, user).unwrap(), Some(9_000_00));

        let rows = history(&conn, user).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "ACME");
        assert_eq!(rows[0].shares, 10);
        assert_eq!(rows[0].total_price, 1_000_00);
    }

    #[test]
    fn rejected_buy_changes_nothing() {
        let mut conn = test_conn();
        let user = seed_user(&conn, 10_000_00);
        buy(&mut conn, user, "ACME", 10, 100_00).unwrap();

        // 1000 shares at $100.00 costs $100,000.00 against $9,000.00 cash.
        let err = buy(&mut conn, user, "ACME", 1000, 100_00).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds));

        assert_eq!(cash_balance(&conn, user).unwrap(), Some(9_000_00));
        assert_eq!(transaction_count(&conn), 1);
    }

    #[test]
    fn buy_cost_overflow_is_rejected() {
        let mut conn = test_conn();
        let user = seed_user(&conn, 10_000_00);

        let err = buy(&mut conn, user, "ACME", i64::MAX, 100_00).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds));
        assert_eq!(transaction_count(&conn), 0);
    }

    #[test]
    fn selling_an_unowned_symbol_is_rejected() {
        let mut conn = test_conn();
        let user = seed_user(&conn, 10_000_00);

        let err = sell(&mut conn, user, "ACME", 1, 100_00).unwrap_err();
        assert!(matches!(err, LedgerError::NotOwned));
        assert_eq!(cash_balance(&conn, user).unwrap(), Some(10_000_00));
        assert_eq!(transaction_count(&conn), 0);
    }

    #[test]
    fn selling_more_than_held_is_rejected() {
        let mut conn = test_conn();
        let user = seed_user(&conn, 10_000_00);
        buy(&mut conn, user, "ACME", 10, 100_00).unwrap();

        let err = sell(&mut conn, user, "ACME", 15, 100_00).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientShares));

        assert_eq!(cash_balance(&conn, user).unwrap(), Some(9_000_00));
        assert_eq!(transaction_count(&conn), 1);
    }

    #[test]
    fn a_position_sold_down_to_zero_cannot_be_sold_again() {
        let mut conn = test_conn();
        let user = seed_user(&conn, 10_000_00);
        buy(&mut conn, user, "ACME", 10, 100_00).unwrap();
        sell(&mut conn, user, "ACME", 10, 100_00).unwrap();

        let err = sell(&mut conn, user, "ACME", 1, 100_00).unwrap_err();
        assert!(matches!(err, LedgerError::NotOwned));
    }

    #[test]
    fn buy_then_sell_at_the_same_price_round_trips_cash() {
        let mut conn = test_conn();
        let user = seed_user(&conn, 10_000_00);

        buy(&mut conn, user, "ACME", 7, 123_45).unwrap();
        sell(&mut conn, user, "ACME", 7, 123_45).unwrap();

        assert_eq!(cash_balance(&conn, user).unwrap(), Some(10_000_00));
        assert!(positions(&conn, user).unwrap().is_empty());
        // Both legs stay on the ledger.
        assert_eq!(transaction_count(&conn), 2);
    }

    #[test]
    fn positions_aggregate_signed_shares_per_symbol() {
        let mut conn = test_conn();
        let user = seed_user(&conn, 100_000_00);

        buy(&mut conn, user, "ACME", 10, 100_00).unwrap();
        buy(&mut conn, user, "ZORK", 5, 20_00).unwrap();
        sell(&mut conn, user, "ACME", 4, 110_00).unwrap();

        let held = positions(&conn, user).unwrap();
        assert_eq!(
            held,
            vec![
                Position {
                    symbol: "ACME".to_string(),
                    shares: 6
                },
                Position {
                    symbol: "ZORK".to_string(),
                    shares: 5
                },
            ]
        );

        sell(&mut conn, user, "ACME", 6, 110_00).unwrap();
        assert_eq!(owned_symbols(&conn, user).unwrap(), vec!["ZORK"]);
    }

    #[test]
    fn cash_stays_non_negative_across_a_trade_sequence() {
        let mut conn = test_conn();
        let user = seed_user(&conn, 1_000_00);

        buy(&mut conn, user, "ACME", 9, 100_00).unwrap();
        assert!(buy(&mut conn, user, "ACME", 2, 100_00).is_err());
        buy(&mut conn, user, "ACME", 1, 100_00).unwrap();

        assert_eq!(cash_balance(&conn, user).unwrap(), Some(0));
    }

    #[test]
    fn history_lists_newest_first_with_absolute_totals() {
        let mut conn = test_conn();
        let user = seed_user(&conn, 10_000_00);

        buy(&mut conn, user, "ACME", 10, 100_00).unwrap();
        sell(&mut conn, user, "ACME", 3, 150_00).unwrap();

        let rows = history(&conn, user).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].shares, -3);
        assert_eq!(rows[0].total_price, 450_00);
        assert_eq!(rows[0].total_price_usd, "$450.00");
        assert_eq!(rows[1].shares, 10);
        assert_eq!(rows[1].total_price, 1_000_00);
    }

    #[test]
    fn trades_for_a_missing_user_are_rejected() {
        let mut conn = test_conn();

        assert!(matches!(
            buy(&mut conn, 42, "ACME", 1, 100_00).unwrap_err(),
            LedgerError::UnknownUser
        ));
        assert!(matches!(
            sell(&mut conn, 42, "ACME", 1, 100_00).unwrap_err(),
            LedgerError::UnknownUser
        ));
    }

    #[test]
    fn duplicate_usernames_are_rejected_without_a_new_row() {
        let conn = test_conn();
        create_user(&conn, "alice", "hash-one", 10_000_00).unwrap();

        let err = create_user(&conn, "alice", "hash-two", 10_000_00).unwrap_err();
        assert!(matches!(err, LedgerError::UsernameTaken));

        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 1);
    }

    #[test]
    fn usernames_match_case_sensitively() {
        let conn = test_conn();
        create_user(&conn, "alice", "hash", 10_000_00).unwrap();

        assert!(user_by_username(&conn, "alice").unwrap().is_some());
        assert!(user_by_username(&conn, "Alice").unwrap().is_none());
        // A differently-cased name is a distinct user.
        create_user(&conn, "Alice", "hash", 10_000_00).unwrap();
    }
}
