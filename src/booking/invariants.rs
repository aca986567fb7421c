//! Reusable invariant checks shared by every lifecycle operation.
//!
//! Uniqueness rules (case-insensitive email, one doctor per user, one
//! patient per user) are all "no other row in `table` has this value in
//! `column`", so they go through one parameterized check instead of a
//! hand-written query per entity.

use rusqlite::{params, Connection};

use super::BookingError;
use crate::db::DatabaseError;
use crate::models::EntityId;

/// A single-column uniqueness rule.
#[derive(Debug, Clone, Copy)]
pub struct UniqueField {
    pub entity: &'static str,
    pub table: &'static str,
    pub column: &'static str,
    pub case_insensitive: bool,
}

pub const USER_EMAIL: UniqueField = UniqueField {
    entity: "User",
    table: "users",
    column: "email",
    case_insensitive: true,
};

pub const DOCTOR_USER: UniqueField = UniqueField {
    entity: "Doctor",
    table: "doctors",
    column: "user_id",
    case_insensitive: false,
};

pub const PATIENT_USER: UniqueField = UniqueField {
    entity: "Patient",
    table: "patients",
    column: "user_id",
    case_insensitive: false,
};

impl UniqueField {
    /// Fails with `Conflict` when another row (not `excluding`) already
    /// holds `value`.
    pub fn ensure_unique<V: rusqlite::ToSql>(
        &self,
        conn: &Connection,
        value: V,
        excluding: Option<EntityId>,
    ) -> Result<(), BookingError> {
        let comparison = if self.case_insensitive {
            format!("{} = ?1 COLLATE NOCASE", self.column)
        } else {
            format!("{} = ?1", self.column)
        };
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {comparison} AND (?2 IS NULL OR id != ?2))",
            self.table
        );
        let taken: bool = conn
            .query_row(&sql, params![value, excluding], |row| row.get(0))
            .map_err(DatabaseError::from)?;
        if taken {
            tracing::debug!(entity = self.entity, column = self.column, "Uniqueness rule refused write");
            return Err(BookingError::Conflict(format!(
                "{} with this {} already exists",
                self.entity, self.column
            )));
        }
        Ok(())
    }
}

/// Unwrap a lookup result or fail with `NotFound`.
pub fn require<T>(found: Option<T>, entity: &'static str, id: EntityId) -> Result<T, BookingError> {
    found.ok_or_else(|| BookingError::not_found(entity, id))
}
