//! Payment ledger: bookkeeping of the money attached to one appointment.
//!
//! Every mutation returns the appointment's new paid sum so the caller can
//! feed it into the confirmation rule. These functions do not open their
//! own transaction; the payment orchestrator wraps them.

use chrono::NaiveDateTime;
use rusqlite::Connection;

use super::invariants::require;
use super::BookingError;
use crate::config::BookingPolicy;
use crate::db::repository::*;
use crate::models::*;

pub fn check_amount(amount: Money) -> Result<(), BookingError> {
    if amount <= 0 {
        return Err(BookingError::Validation(format!(
            "Payment amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

/// Payments may only change while the appointment is still active.
pub fn ensure_payable(appointment: &Appointment) -> Result<(), BookingError> {
    if appointment.status.is_terminal() {
        tracing::warn!(
            appointment_id = appointment.id,
            status = %appointment.status,
            "Refused payment change on a closed appointment"
        );
        return Err(BookingError::State(format!(
            "Appointment {} is {} and no longer accepts payment changes",
            appointment.id, appointment.status
        )));
    }
    Ok(())
}

/// One payer per slot: a Paid payment is refused when another patient
/// already holds a Paid payment on the same slot.
pub fn check_single_payer(
    conn: &Connection,
    appointment: &Appointment,
    status: PaymentStatus,
    excluding: Option<EntityId>,
) -> Result<(), BookingError> {
    if status != PaymentStatus::Paid {
        return Ok(());
    }
    if other_patient_paid_on_slot(conn, appointment.slot_id, appointment.patient_id, excluding)? {
        tracing::warn!(
            appointment_id = appointment.id,
            slot_id = appointment.slot_id,
            "Refused payment: another patient already paid for this slot"
        );
        return Err(BookingError::Conflict(
            "Cannot accept payment: another patient already paid for this slot".into(),
        ));
    }
    Ok(())
}

/// Paid sum after writing a payment of `amount`/`status`, with the record
/// being replaced (if any) left out. Fails when it would exceed the price.
fn capped_paid_sum(
    conn: &Connection,
    appointment: &Appointment,
    slot: &Slot,
    amount: Money,
    status: PaymentStatus,
    excluding: Option<EntityId>,
) -> Result<Money, BookingError> {
    let base = paid_sum_for_appointment(conn, appointment.id, excluding)?;
    let resulting = match status {
        PaymentStatus::Paid => base.checked_add(amount).ok_or_else(|| {
            BookingError::Validation("Payment amount overflows the paid sum".into())
        })?,
        PaymentStatus::Refunded => base,
    };
    if resulting > slot.price {
        return Err(BookingError::Conflict(format!(
            "Paid sum {resulting} would exceed the slot price {}",
            slot.price
        )));
    }
    Ok(resulting)
}

/// Pre-write checks shared by create and update.
fn validate_payment(
    conn: &Connection,
    appointment: &Appointment,
    slot: &Slot,
    amount: Money,
    status: PaymentStatus,
    excluding: Option<EntityId>,
) -> Result<Money, BookingError> {
    check_amount(amount)?;
    ensure_payable(appointment)?;
    check_single_payer(conn, appointment, status, excluding)?;
    capped_paid_sum(conn, appointment, slot, amount, status, excluding)
}

pub fn create(
    conn: &Connection,
    appointment: &Appointment,
    slot: &Slot,
    payment: &NewPayment,
    paid_at: NaiveDateTime,
) -> Result<(Payment, Money), BookingError> {
    let expected = validate_payment(conn, appointment, slot, payment.amount, payment.status, None)?;
    let stored = insert_payment(conn, payment, paid_at)?;
    Ok((stored, expected))
}

pub fn update(
    conn: &Connection,
    appointment: &Appointment,
    slot: &Slot,
    payment: &Payment,
) -> Result<Money, BookingError> {
    validate_payment(conn, appointment, slot, payment.amount, payment.status, Some(payment.id))?;
    update_payment_row(conn, payment)?;
    Ok(paid_sum_for_appointment(conn, appointment.id, None)?)
}

pub fn delete(
    conn: &Connection,
    appointment: &Appointment,
    payment_id: EntityId,
) -> Result<Money, BookingError> {
    ensure_payable(appointment)?;
    delete_payment_row(conn, payment_id)?;
    Ok(paid_sum_for_appointment(conn, appointment.id, None)?)
}

/// Refund sweep run when an appointment is cancelled.
///
/// No-op unless the appointment is Cancelled and its slot starts at least
/// `policy.refund_cutoff()` after `now`. Returns the number of payments
/// flipped to Refunded.
pub fn refund_paid_payments_for_cancellation(
    conn: &Connection,
    appointment_id: EntityId,
    now: NaiveDateTime,
    policy: &BookingPolicy,
) -> Result<usize, BookingError> {
    let appointment = require(get_appointment(conn, appointment_id)?, "Appointment", appointment_id)?;
    if appointment.status != AppointmentStatus::Cancelled {
        return Ok(0);
    }
    let slot = require(get_slot(conn, appointment.slot_id)?, "Slot", appointment.slot_id)?;

    let notice = slot.starts_at() - now;
    if notice < policy.refund_cutoff() {
        tracing::info!(
            appointment_id,
            notice_minutes = notice.num_minutes(),
            "Cancellation inside refund cutoff, payments kept"
        );
        return Ok(0);
    }

    let refunded = mark_payments_refunded(conn, appointment_id)?;
    if refunded > 0 {
        tracing::info!(appointment_id, refunded, "Payments refunded on cancellation");
    }
    Ok(refunded)
}
