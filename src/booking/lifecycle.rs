//! Appointment lifecycle: booking validation and the status state machine.
//!
//! ```text
//!   Scheduled ──paid ≥ price──▶ Confirmed ──complete──▶ Completed
//!       ▲                          │
//!       └───────paid < price───────┘
//!   Scheduled | Confirmed ──cancel──▶ Cancelled (conditional refund)
//! ```
//!
//! Cancelled and Completed are terminal: the row is immutable afterwards.

use chrono::NaiveDateTime;
use rusqlite::Connection;

use super::invariants::require;
use super::ledger::refund_paid_payments_for_cancellation;
use super::occupancy::recompute_busy;
use super::BookingError;
use crate::config::BookingPolicy;
use crate::db::repository::*;
use crate::db::with_transaction;
use crate::models::*;

/// The confirmation rule applied after every ledger mutation.
///
/// Returns the status the appointment should move to, or `None` when it
/// stays where it is. Terminal statuses never move.
pub fn auto_transition(
    status: AppointmentStatus,
    paid_sum: Money,
    price: Money,
) -> Option<AppointmentStatus> {
    match status {
        AppointmentStatus::Scheduled if paid_sum >= price => Some(AppointmentStatus::Confirmed),
        AppointmentStatus::Confirmed if paid_sum < price => Some(AppointmentStatus::Scheduled),
        _ => None,
    }
}

/// Whether `from -> to` is a legal explicit transition given the money
/// collected so far.
pub fn check_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
    paid_sum: Money,
    price: Money,
) -> Result<(), BookingError> {
    use AppointmentStatus::*;

    if from == to {
        return Ok(());
    }
    if from.is_terminal() {
        return Err(BookingError::State(format!(
            "Cannot change status after {from}"
        )));
    }
    match (from, to) {
        (_, Cancelled) => Ok(()),
        (Confirmed, Completed) => Ok(()),
        (_, Completed) => Err(BookingError::State(format!(
            "Only a Confirmed appointment can be completed, this one is {from}"
        ))),
        (Scheduled, Confirmed) if paid_sum >= price => Ok(()),
        (Scheduled, Confirmed) => Err(BookingError::State(format!(
            "Confirmation requires full payment ({paid_sum} of {price} paid)"
        ))),
        (Confirmed, Scheduled) if paid_sum < price => Ok(()),
        (Confirmed, Scheduled) => Err(BookingError::State(
            "A fully paid appointment stays Confirmed".into(),
        )),
        _ => Err(BookingError::State(format!("Illegal transition {from} -> {to}"))),
    }
}

/// Re-read the appointment, apply `auto_transition`, persist any change.
/// Returns the resulting status.
pub fn apply_payment_rule(
    conn: &Connection,
    appointment_id: EntityId,
    paid_sum: Money,
    price: Money,
) -> Result<AppointmentStatus, BookingError> {
    let current = require(get_appointment(conn, appointment_id)?, "Appointment", appointment_id)?;
    match auto_transition(current.status, paid_sum, price) {
        Some(next) => {
            set_appointment_status(conn, appointment_id, next)?;
            tracing::info!(
                appointment_id,
                from = %current.status,
                to = %next,
                paid_sum,
                price,
                "Appointment status follows payments"
            );
            Ok(next)
        }
        None => Ok(current.status),
    }
}

/// Booking rules for a (doctor, patient, slot, time) tuple. Returns the slot.
///
/// `excluding` is the appointment being updated, so it does not count as a
/// duplicate of itself.
pub fn validate_booking(
    conn: &Connection,
    request: &BookingRequest,
    now: NaiveDateTime,
    excluding: Option<EntityId>,
) -> Result<Slot, BookingError> {
    let slot = require(get_slot(conn, request.slot_id)?, "Slot", request.slot_id)?;
    let doctor = require(get_doctor(conn, request.doctor_id)?, "Doctor", request.doctor_id)?;
    let patient = require(get_patient(conn, request.patient_id)?, "Patient", request.patient_id)?;

    if slot.doctor_id != doctor.id {
        return Err(BookingError::Validation(format!(
            "Slot {} belongs to doctor {}, not doctor {}",
            slot.id, slot.doctor_id, doctor.id
        )));
    }
    if !slot.contains(request.scheduled_time) {
        return Err(BookingError::Validation(format!(
            "Scheduled time {} is outside slot {} ({} {} - {})",
            request.scheduled_time, slot.id, slot.date, slot.start_time, slot.end_time
        )));
    }
    if request.scheduled_time < now {
        return Err(BookingError::Validation(format!(
            "Scheduled time {} is in the past",
            request.scheduled_time
        )));
    }
    if doctor.user_id == patient.user_id {
        return Err(BookingError::Validation(
            "A doctor cannot book an appointment with themself".into(),
        ));
    }
    if patient_has_active_appointment(conn, patient.id, slot.id, excluding)? {
        return Err(BookingError::Conflict(format!(
            "Patient {} already has an active appointment for slot {}",
            patient.id, slot.id
        )));
    }
    Ok(slot)
}

/// Book a slot. The appointment always starts Scheduled.
pub fn create_appointment(
    conn: &Connection,
    request: &BookingRequest,
    now: NaiveDateTime,
) -> Result<Appointment, BookingError> {
    with_transaction(conn, |tx| {
        validate_booking(tx, request, now, None)?;
        let appointment = insert_appointment(tx, request)?;
        recompute_busy(tx, appointment.slot_id)?;
        tracing::info!(
            appointment_id = appointment.id,
            slot_id = appointment.slot_id,
            patient_id = appointment.patient_id,
            "Appointment booked"
        );
        Ok(appointment)
    })
}

fn booking_fields_changed(old: &Appointment, new: &Appointment) -> bool {
    old.doctor_id != new.doctor_id
        || old.patient_id != new.patient_id
        || old.slot_id != new.slot_id
        || old.scheduled_time != new.scheduled_time
}

/// Update an appointment.
///
/// Field edits are re-validated against the (possibly new) slot. A status
/// change goes through `check_transition`; cancelling also runs the refund
/// sweep. Busy flags of every slot touched are recomputed in the same unit.
pub fn update_appointment(
    conn: &Connection,
    appointment: &Appointment,
    now: NaiveDateTime,
    policy: &BookingPolicy,
) -> Result<(), BookingError> {
    with_transaction(conn, |tx| apply_update(tx, appointment, now, policy))
}

/// Move an appointment to `status`, keeping every other field. The row is
/// read and written inside one transaction.
pub fn change_status(
    conn: &Connection,
    appointment_id: EntityId,
    status: AppointmentStatus,
    now: NaiveDateTime,
    policy: &BookingPolicy,
) -> Result<(), BookingError> {
    with_transaction(conn, |tx| {
        let mut appointment = require(get_appointment(tx, appointment_id)?, "Appointment", appointment_id)?;
        appointment.status = status;
        apply_update(tx, &appointment, now, policy)
    })
}

fn apply_update(
    tx: &Connection,
    appointment: &Appointment,
    now: NaiveDateTime,
    policy: &BookingPolicy,
) -> Result<(), BookingError> {
    let existing = require(get_appointment(tx, appointment.id)?, "Appointment", appointment.id)?;

    if existing.status.is_terminal() {
        if existing == *appointment {
            return Ok(());
        }
        tracing::warn!(appointment_id = existing.id, status = %existing.status, "Refused change to a closed appointment");
        return Err(BookingError::State(format!(
            "Cannot change status after {}",
            existing.status
        )));
    }

    let fields_changed = booking_fields_changed(&existing, appointment);
    let target_slot = if fields_changed {
        let request = BookingRequest {
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            slot_id: appointment.slot_id,
            scheduled_time: appointment.scheduled_time,
        };
        validate_booking(tx, &request, now, Some(existing.id))?
    } else {
        require(get_slot(tx, existing.slot_id)?, "Slot", existing.slot_id)?
    };

    let paid = paid_sum_for_appointment(tx, existing.id, None)?;

    // Paid money follows the booking, so the target slot keeps a single payer.
    let payer_moved = existing.slot_id != appointment.slot_id || existing.patient_id != appointment.patient_id;
    if payer_moved
        && paid > 0
        && other_booking_paid_on_slot(tx, appointment.slot_id, appointment.patient_id, existing.id)?
    {
        tracing::warn!(
            appointment_id = existing.id,
            slot_id = appointment.slot_id,
            patient_id = appointment.patient_id,
            "Refused move onto a slot paid by another patient"
        );
        return Err(BookingError::Conflict(format!(
            "Cannot move appointment {}: another patient already paid for slot {}",
            existing.id, appointment.slot_id
        )));
    }

    if appointment.status == existing.status {
        // A plain field edit must not silently break the paid/status pairing.
        let unpaid_booking = paid == 0 && existing.status == AppointmentStatus::Scheduled;
        if existing.slot_id != target_slot.id
            && !unpaid_booking
            && auto_transition(existing.status, paid, target_slot.price).is_some()
        {
            return Err(BookingError::Conflict(format!(
                "Moving appointment {} to slot {} does not fit its {} payments ({paid} paid, price {})",
                existing.id, target_slot.id, existing.status, target_slot.price
            )));
        }
        if paid > target_slot.price {
            return Err(BookingError::Conflict(format!(
                "Paid sum {paid} exceeds the price {} of slot {}",
                target_slot.price, target_slot.id
            )));
        }
        update_appointment_row(tx, appointment)?;
    } else {
        check_transition(existing.status, appointment.status, paid, target_slot.price)?;
        if paid > target_slot.price {
            return Err(BookingError::Conflict(format!(
                "Paid sum {paid} exceeds the price {} of slot {}",
                target_slot.price, target_slot.id
            )));
        }
        update_appointment_row(tx, appointment)?;
        tracing::info!(
            appointment_id = appointment.id,
            from = %existing.status,
            to = %appointment.status,
            "Appointment status changed"
        );
        if appointment.status == AppointmentStatus::Cancelled {
            refund_paid_payments_for_cancellation(tx, appointment.id, now, policy)?;
        }
    }

    recompute_busy(tx, existing.slot_id)?;
    if existing.slot_id != appointment.slot_id {
        recompute_busy(tx, appointment.slot_id)?;
    }
    Ok(())
}

/// Delete an appointment (and its payments). Absent rows are a no-op.
pub fn delete_appointment(conn: &Connection, id: EntityId) -> Result<(), BookingError> {
    with_transaction(conn, |tx| {
        let Some(existing) = get_appointment(tx, id)? else {
            return Ok(());
        };
        delete_appointment_row(tx, id)?;
        recompute_busy(tx, existing.slot_id)?;
        tracing::info!(appointment_id = id, slot_id = existing.slot_id, "Appointment deleted");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::ErrorKind;
    use crate::db::repository::fixtures::{self, at, date};
    use crate::db::sqlite::open_memory_database;

    fn now() -> NaiveDateTime {
        at(date(2030, 1, 1), 12, 0)
    }

    struct World {
        conn: Connection,
        doctor: Doctor,
        patient: Patient,
        slot: Slot,
    }

    fn world() -> World {
        let conn = open_memory_database().unwrap();
        let doctor = fixtures::doctor(&conn, "d@example.com");
        let patient = fixtures::patient(&conn, "p@example.com");
        let slot = fixtures::slot(&conn, doctor.id, date(2030, 1, 2), 9, 10, 1500);
        World { conn, doctor, patient, slot }
    }

    fn request(w: &World) -> BookingRequest {
        BookingRequest {
            doctor_id: w.doctor.id,
            patient_id: w.patient.id,
            slot_id: w.slot.id,
            scheduled_time: at(date(2030, 1, 2), 9, 30),
        }
    }

    #[test]
    fn auto_transition_rule() {
        use AppointmentStatus::*;
        assert_eq!(auto_transition(Scheduled, 1500, 1500), Some(Confirmed));
        assert_eq!(auto_transition(Scheduled, 1499, 1500), None);
        assert_eq!(auto_transition(Confirmed, 1499, 1500), Some(Scheduled));
        assert_eq!(auto_transition(Confirmed, 1500, 1500), None);
        assert_eq!(auto_transition(Cancelled, 0, 1500), None);
        assert_eq!(auto_transition(Completed, 0, 1500), None);
    }

    #[test]
    fn transition_table() {
        use AppointmentStatus::*;
        assert!(check_transition(Scheduled, Cancelled, 0, 100).is_ok());
        assert!(check_transition(Confirmed, Cancelled, 100, 100).is_ok());
        assert!(check_transition(Confirmed, Completed, 100, 100).is_ok());
        assert_eq!(check_transition(Scheduled, Completed, 0, 100).unwrap_err().kind(), ErrorKind::State);
        assert_eq!(check_transition(Cancelled, Scheduled, 0, 100).unwrap_err().kind(), ErrorKind::State);
        assert_eq!(check_transition(Completed, Cancelled, 0, 100).unwrap_err().kind(), ErrorKind::State);
        assert!(check_transition(Completed, Completed, 0, 100).is_ok());
        assert!(check_transition(Scheduled, Confirmed, 100, 100).is_ok());
        assert_eq!(check_transition(Scheduled, Confirmed, 99, 100).unwrap_err().kind(), ErrorKind::State);
        assert!(check_transition(Confirmed, Scheduled, 99, 100).is_ok());
        assert_eq!(check_transition(Confirmed, Scheduled, 100, 100).unwrap_err().kind(), ErrorKind::State);
    }

    #[test]
    fn terminal_error_names_the_status() {
        let err = check_transition(
            AppointmentStatus::Completed,
            AppointmentStatus::Scheduled,
            0,
            0,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Cannot change status after Completed"));
    }

    #[test]
    fn create_books_scheduled_and_marks_slot_busy() {
        let w = world();
        let a = create_appointment(&w.conn, &request(&w), now()).unwrap();
        assert_eq!(a.status, AppointmentStatus::Scheduled);
        assert!(get_slot(&w.conn, w.slot.id).unwrap().unwrap().is_busy);
    }

    #[test]
    fn create_rejects_mismatched_doctor() {
        let w = world();
        let other = fixtures::doctor(&w.conn, "other@example.com");
        let mut req = request(&w);
        req.doctor_id = other.id;
        let err = create_appointment(&w.conn, &req, now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!get_slot(&w.conn, w.slot.id).unwrap().unwrap().is_busy);
    }

    #[test]
    fn create_rejects_time_outside_slot_or_in_past() {
        let w = world();
        let mut req = request(&w);
        req.scheduled_time = at(date(2030, 1, 2), 10, 1);
        assert_eq!(create_appointment(&w.conn, &req, now()).unwrap_err().kind(), ErrorKind::Validation);

        req.scheduled_time = at(date(2030, 1, 2), 9, 15);
        let later = at(date(2030, 1, 2), 9, 20);
        assert_eq!(create_appointment(&w.conn, &req, later).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn create_rejects_unknown_references() {
        let w = world();
        let mut req = request(&w);
        req.slot_id = 999;
        assert_eq!(create_appointment(&w.conn, &req, now()).unwrap_err().kind(), ErrorKind::NotFound);
        let mut req = request(&w);
        req.patient_id = 999;
        assert_eq!(create_appointment(&w.conn, &req, now()).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn doctor_cannot_book_themself() {
        let w = world();
        let self_patient = insert_patient(&w.conn, w.doctor.user_id, date(1980, 1, 1)).unwrap();
        let mut req = request(&w);
        req.patient_id = self_patient.id;
        assert_eq!(create_appointment(&w.conn, &req, now()).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn duplicate_active_booking_conflicts() {
        let w = world();
        create_appointment(&w.conn, &request(&w), now()).unwrap();
        let err = create_appointment(&w.conn, &request(&w), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn completing_requires_confirmed() {
        let w = world();
        let a = create_appointment(&w.conn, &request(&w), now()).unwrap();
        let policy = BookingPolicy::default();
        let err = change_status(&w.conn, a.id, AppointmentStatus::Completed, now(), &policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(get_appointment(&w.conn, a.id).unwrap().unwrap().status, AppointmentStatus::Scheduled);
    }

    #[test]
    fn cancelled_appointment_is_immutable() {
        let w = world();
        let a = create_appointment(&w.conn, &request(&w), now()).unwrap();
        let policy = BookingPolicy::default();
        change_status(&w.conn, a.id, AppointmentStatus::Cancelled, now(), &policy).unwrap();
        assert!(!get_slot(&w.conn, w.slot.id).unwrap().unwrap().is_busy);

        // Re-saving the identical row is accepted as a no-op.
        let stored = get_appointment(&w.conn, a.id).unwrap().unwrap();
        update_appointment(&w.conn, &stored, now(), &policy).unwrap();

        let mut edited = stored.clone();
        edited.scheduled_time = at(date(2030, 1, 2), 9, 45);
        assert_eq!(update_appointment(&w.conn, &edited, now(), &policy).unwrap_err().kind(), ErrorKind::State);

        let err = change_status(&w.conn, a.id, AppointmentStatus::Scheduled, now(), &policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn field_edit_has_no_transition_side_effects() {
        let w = world();
        let a = create_appointment(&w.conn, &request(&w), now()).unwrap();
        let mut edited = a.clone();
        edited.scheduled_time = at(date(2030, 1, 2), 9, 45);
        update_appointment(&w.conn, &edited, now(), &BookingPolicy::default()).unwrap();
        let stored = get_appointment(&w.conn, a.id).unwrap().unwrap();
        assert_eq!(stored.scheduled_time, edited.scheduled_time);
        assert_eq!(stored.status, AppointmentStatus::Scheduled);
    }

    #[test]
    fn moving_to_another_slot_recomputes_both_flags() {
        let w = world();
        let a = create_appointment(&w.conn, &request(&w), now()).unwrap();
        let other = fixtures::slot(&w.conn, w.doctor.id, date(2030, 1, 2), 11, 12, 1500);

        let mut moved = a.clone();
        moved.slot_id = other.id;
        moved.scheduled_time = at(date(2030, 1, 2), 11, 0);
        update_appointment(&w.conn, &moved, now(), &BookingPolicy::default()).unwrap();

        assert!(!get_slot(&w.conn, w.slot.id).unwrap().unwrap().is_busy);
        assert!(get_slot(&w.conn, other.id).unwrap().unwrap().is_busy);
    }

    fn pay(conn: &Connection, appointment_id: EntityId, amount: Money) {
        crate::booking::orchestrator::create_payment(
            conn,
            &NewPayment { appointment_id, amount, status: PaymentStatus::Paid },
            now(),
        )
        .unwrap();
    }

    #[test]
    fn paid_booking_cannot_move_onto_slot_paid_by_another_patient() {
        let w = world();
        let a = create_appointment(&w.conn, &request(&w), now()).unwrap();
        pay(&w.conn, a.id, 100);

        let other_slot = fixtures::slot(&w.conn, w.doctor.id, date(2030, 1, 2), 11, 12, 1500);
        let rival = fixtures::patient(&w.conn, "q@example.com");
        let b = create_appointment(&w.conn, &BookingRequest {
            doctor_id: w.doctor.id,
            patient_id: rival.id,
            slot_id: other_slot.id,
            scheduled_time: at(date(2030, 1, 2), 11, 0),
        }, now())
        .unwrap();
        pay(&w.conn, b.id, 100);

        let mut moved = a.clone();
        moved.slot_id = other_slot.id;
        moved.scheduled_time = at(date(2030, 1, 2), 11, 30);
        let err = update_appointment(&w.conn, &moved, now(), &BookingPolicy::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("another patient already paid"));

        assert_eq!(get_appointment(&w.conn, a.id).unwrap().unwrap(), a);
        assert!(get_slot(&w.conn, w.slot.id).unwrap().unwrap().is_busy);
    }

    #[test]
    fn paid_booking_may_change_patient_on_its_own_slot() {
        let w = world();
        let a = create_appointment(&w.conn, &request(&w), now()).unwrap();
        pay(&w.conn, a.id, 100);
        let other = fixtures::patient(&w.conn, "q@example.com");

        let mut edited = a.clone();
        edited.patient_id = other.id;
        update_appointment(&w.conn, &edited, now(), &BookingPolicy::default()).unwrap();
        assert_eq!(get_appointment(&w.conn, a.id).unwrap().unwrap().patient_id, other.id);
    }

    #[test]
    fn change_status_keeps_other_fields_and_reports_missing_rows() {
        let w = world();
        let a = create_appointment(&w.conn, &request(&w), now()).unwrap();
        let policy = BookingPolicy::default();

        change_status(&w.conn, a.id, AppointmentStatus::Cancelled, now(), &policy).unwrap();
        let stored = get_appointment(&w.conn, a.id).unwrap().unwrap();
        assert_eq!(stored, Appointment { status: AppointmentStatus::Cancelled, ..a });

        let err = change_status(&w.conn, 999, AppointmentStatus::Cancelled, now(), &policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn delete_frees_slot_and_is_idempotent() {
        let w = world();
        let a = create_appointment(&w.conn, &request(&w), now()).unwrap();
        delete_appointment(&w.conn, a.id).unwrap();
        assert!(!get_slot(&w.conn, w.slot.id).unwrap().unwrap().is_busy);
        delete_appointment(&w.conn, a.id).unwrap();
    }
}
