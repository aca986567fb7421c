//! Users and the doctor/patient profiles hanging off them.

use chrono::NaiveDate;
use rusqlite::Connection;

use super::invariants::{require, UniqueField, DOCTOR_USER, PATIENT_USER, USER_EMAIL};
use super::BookingError;
use crate::db::repository as repo;
use crate::db::with_transaction;
use crate::models::*;

fn check_user_fields(name: &str, email: &str) -> Result<(), BookingError> {
    if name.trim().is_empty() {
        return Err(BookingError::Validation("User name cannot be empty".into()));
    }
    if email.trim().is_empty() {
        return Err(BookingError::Validation("User email cannot be empty".into()));
    }
    Ok(())
}

pub fn create_user(conn: &Connection, user: &NewUser) -> Result<User, BookingError> {
    check_user_fields(&user.name, &user.email)?;
    with_transaction(conn, |tx| {
        USER_EMAIL.ensure_unique(tx, user.email.trim(), None)?;
        let stored = repo::insert_user(tx, &NewUser {
            email: user.email.trim().to_string(),
            ..user.clone()
        })?;
        tracing::info!(user_id = stored.id, role = %stored.role, "User created");
        Ok(stored)
    })
}

pub fn update_user(conn: &Connection, user: &User) -> Result<(), BookingError> {
    check_user_fields(&user.name, &user.email)?;
    with_transaction(conn, |tx| {
        require(repo::get_user(tx, user.id)?, "User", user.id)?;
        USER_EMAIL.ensure_unique(tx, user.email.trim(), Some(user.id))?;
        repo::update_user(tx, &User {
            email: user.email.trim().to_string(),
            ..user.clone()
        })?;
        tracing::info!(user_id = user.id, "User updated");
        Ok(())
    })
}

/// Shared checks for attaching a profile to a user.
fn ensure_linkable(conn: &Connection, rule: UniqueField, user_id: EntityId) -> Result<(), BookingError> {
    require(repo::get_user(conn, user_id)?, "User", user_id)?;
    rule.ensure_unique(conn, user_id, None).map_err(|e| match e {
        BookingError::Conflict(_) => BookingError::Conflict(format!(
            "User {user_id} is already linked to a {} profile",
            rule.entity.to_lowercase()
        )),
        other => other,
    })
}

pub fn create_doctor(
    conn: &Connection,
    user_id: EntityId,
    specialization: &str,
) -> Result<Doctor, BookingError> {
    with_transaction(conn, |tx| {
        ensure_linkable(tx, DOCTOR_USER, user_id)?;
        let doctor = repo::insert_doctor(tx, user_id, specialization)?;
        tracing::info!(doctor_id = doctor.id, user_id, "Doctor profile created");
        Ok(doctor)
    })
}

pub fn create_patient(
    conn: &Connection,
    user_id: EntityId,
    date_of_birth: NaiveDate,
    today: NaiveDate,
) -> Result<Patient, BookingError> {
    if date_of_birth > today {
        return Err(BookingError::Validation(format!(
            "Date of birth {date_of_birth} is in the future"
        )));
    }
    with_transaction(conn, |tx| {
        ensure_linkable(tx, PATIENT_USER, user_id)?;
        let patient = repo::insert_patient(tx, user_id, date_of_birth)?;
        tracing::info!(patient_id = patient.id, user_id, "Patient profile created");
        Ok(patient)
    })
}
