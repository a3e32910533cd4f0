use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct DatabasePool(pub Arc<Mutex<rusqlite::Connection>>);

impl DatabasePool {
    /// Opens (or creates) the ledger database at `path`.
    pub fn new(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }

    /// In-memory database with the full schema. Used by tests.
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }
}

/// Creates the ledger schema if it does not exist yet.
///
/// Holdings are not stored: they are derived from the signed `shares`
/// column of the append-only transactions table.
pub fn init_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            cash INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            symbol TEXT NOT NULL,
            shares INTEGER NOT NULL,
            unit_price INTEGER NOT NULL,
            timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (user_id) REFERENCES users(id)
        )",
        [],
    )?;

    // The grouped SUM(shares) queries scan by user and symbol.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_user_symbol
         ON transactions (user_id, symbol)",
        [],
    )?;

    Ok(())
}
