//! Scoped write transactions.
//!
//! Every mutating booking operation runs inside exactly one unit opened
//! here. The transaction is IMMEDIATE so that concurrent writers queue on
//! the database write lock instead of discovering each other at commit.
//! Any `Err` returned by the body (or a panic unwinding through it) drops
//! the `Transaction` uncommitted, which rolls it back.

use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Run `body` inside an immediate transaction and commit if it succeeds.
pub fn with_transaction<T, E, F>(conn: &Connection, body: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<rusqlite::Error>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = body(&tx)?;
    tx.commit()?;
    Ok(value)
}
