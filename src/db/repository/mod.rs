//! Repository layer: entity-scoped database operations.
//!
//! Plain row access only: business rules live in `crate::booking`, which
//! calls these functions inside its transactions.

mod appointment;
mod payment;
mod person;
mod slot;

pub use appointment::*;
pub use payment::*;
pub use person::*;
pub use slot::*;

use super::DatabaseError;

/// Map `QueryReturnedNoRows` to `None`, keeping every other error.
pub(crate) fn optional<T>(result: rusqlite::Result<T>) -> Result<Option<T>, DatabaseError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
