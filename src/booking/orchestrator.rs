//! Payment orchestration.
//!
//! Each operation is one IMMEDIATE transaction: load a fresh snapshot of
//! the appointment and its slot, mutate the ledger, apply the confirmation
//! rule, recompute the slot's busy flag. Either all of it lands or none.

use chrono::NaiveDateTime;
use rusqlite::Connection;

use super::invariants::require;
use super::ledger;
use super::lifecycle::apply_payment_rule;
use super::occupancy::recompute_busy;
use super::BookingError;
use crate::db::repository::*;
use crate::db::with_transaction;
use crate::models::*;

fn snapshot(conn: &Connection, appointment_id: EntityId) -> Result<(Appointment, Slot), BookingError> {
    let appointment = require(get_appointment(conn, appointment_id)?, "Appointment", appointment_id)?;
    let slot = require(get_slot(conn, appointment.slot_id)?, "Slot", appointment.slot_id)?;
    Ok((appointment, slot))
}

fn settle(conn: &Connection, appointment: &Appointment, slot: &Slot, paid: Money) -> Result<(), BookingError> {
    let status = apply_payment_rule(conn, appointment.id, paid, slot.price)?;
    recompute_busy(conn, slot.id)?;
    tracing::debug!(appointment_id = appointment.id, paid, price = slot.price, status = %status, "Payment settled");
    Ok(())
}

/// Record a payment. Returns the appointment's new paid sum.
pub fn create_payment(
    conn: &Connection,
    payment: &NewPayment,
    now: NaiveDateTime,
) -> Result<(Payment, Money), BookingError> {
    with_transaction(conn, |tx| {
        let (appointment, slot) = snapshot(tx, payment.appointment_id)?;
        let (stored, paid) = ledger::create(tx, &appointment, &slot, payment, now)?;
        settle(tx, &appointment, &slot, paid)?;
        tracing::info!(
            payment_id = stored.id,
            appointment_id = appointment.id,
            amount = stored.amount,
            status = %stored.status,
            "Payment recorded"
        );
        Ok((stored, paid))
    })
}

/// Replace amount and status of an existing payment. The owning
/// appointment cannot change. Returns the new paid sum.
pub fn update_payment(conn: &Connection, payment: &Payment) -> Result<Money, BookingError> {
    with_transaction(conn, |tx| {
        let existing = require(get_payment(tx, payment.id)?, "Payment", payment.id)?;
        if existing.appointment_id != payment.appointment_id {
            return Err(BookingError::Validation(format!(
                "Payment {} belongs to appointment {} and cannot be moved",
                existing.id, existing.appointment_id
            )));
        }
        let (appointment, slot) = snapshot(tx, existing.appointment_id)?;
        let paid = ledger::update(tx, &appointment, &slot, payment)?;
        settle(tx, &appointment, &slot, paid)?;
        tracing::info!(payment_id = payment.id, appointment_id = appointment.id, paid, "Payment updated");
        Ok(paid)
    })
}

/// Delete a payment. Returns `None` when it did not exist, otherwise the
/// appointment's remaining paid sum.
pub fn delete_payment(conn: &Connection, payment_id: EntityId) -> Result<Option<Money>, BookingError> {
    with_transaction(conn, |tx| {
        let Some(existing) = get_payment(tx, payment_id)? else {
            return Ok(None);
        };
        let (appointment, slot) = snapshot(tx, existing.appointment_id)?;
        let paid = ledger::delete(tx, &appointment, payment_id)?;
        settle(tx, &appointment, &slot, paid)?;
        tracing::info!(payment_id, appointment_id = appointment.id, paid, "Payment deleted");
        Ok(Some(paid))
    })
}
