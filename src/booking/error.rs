//! Booking error taxonomy.
//!
//! Every business-rule refusal carries one of five kinds so a transport
//! layer can map it without parsing messages. Storage failures that are
//! not a rule violation travel as `Database`.

use rusqlite::ErrorCode;
use serde::Serialize;
use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Concurrent update lost: {0}")]
    Concurrency(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

/// Transport-facing classification of a `BookingError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    State,
    Concurrency,
    Internal,
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::State(_) => ErrorKind::State,
            Self::Concurrency(_) => ErrorKind::Concurrency,
            Self::Database(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => {
                let detail = e.to_string();
                if detail.contains("UNIQUE") {
                    BookingError::Conflict(detail)
                } else {
                    BookingError::Validation(detail)
                }
            }
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                BookingError::Concurrency(e.to_string())
            }
            _ => BookingError::Database(DatabaseError::Sqlite(e)),
        }
    }
}

impl From<DatabaseError> for BookingError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Sqlite(inner) => BookingError::from(inner),
            other => BookingError::Database(other),
        }
    }
}
