//! Slot validation and the slot lifecycle (create, update, delete).
//!
//! A slot may not overlap a sibling slot of the same doctor on the same
//! date, and is locked once a Confirmed or Completed appointment points
//! at it.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;

use super::invariants::require;
use super::lifecycle::apply_payment_rule;
use super::occupancy::recompute_busy;
use super::BookingError;
use crate::db::repository::*;
use crate::db::with_transaction;
use crate::models::*;

/// Half-open interval intersection test on `[start, end)`.
pub fn intervals_overlap(
    a: (NaiveTime, NaiveTime),
    b: (NaiveTime, NaiveTime),
) -> bool {
    let (a_start, a_end) = a;
    let (b_start, b_end) = b;
    !(a_end <= b_start || a_start >= b_end)
}

/// First sibling whose interval intersects the draft, if any.
pub fn find_overlap<'a>(draft: &SlotDraft, siblings: &'a [Slot], excluding: Option<EntityId>) -> Option<&'a Slot> {
    siblings
        .iter()
        .filter(|s| Some(s.id) != excluding)
        .filter(|s| s.doctor_id == draft.doctor_id && s.date == draft.date)
        .find(|s| intervals_overlap((draft.start_time, draft.end_time), (s.start_time, s.end_time)))
}

/// Field-level rules that need no storage access.
pub fn check_slot_fields(draft: &SlotDraft, today: NaiveDate) -> Result<(), BookingError> {
    if draft.start_time >= draft.end_time {
        return Err(BookingError::Validation(
            "Slot start time must be before its end time".into(),
        ));
    }
    if draft.date < today {
        return Err(BookingError::Validation(format!(
            "Slot date {} is in the past",
            draft.date
        )));
    }
    if draft.price < 0 {
        return Err(BookingError::Validation("Slot price cannot be negative".into()));
    }
    Ok(())
}

/// Full slot validation: field rules, doctor existence, no overlap with
/// the doctor's other slots that day.
pub fn validate_slot(
    conn: &Connection,
    draft: &SlotDraft,
    excluding: Option<EntityId>,
    today: NaiveDate,
) -> Result<(), BookingError> {
    check_slot_fields(draft, today)?;
    require(get_doctor(conn, draft.doctor_id)?, "Doctor", draft.doctor_id)?;

    let siblings = list_slots_for_doctor_date(conn, draft.doctor_id, draft.date)?;
    if let Some(clash) = find_overlap(draft, &siblings, excluding) {
        return Err(BookingError::Conflict(format!(
            "Slot overlaps slot {} ({} - {})",
            clash.id, clash.start_time, clash.end_time
        )));
    }
    Ok(())
}

/// Fails with `State` when a Confirmed or Completed appointment binds the slot.
pub fn ensure_unlocked(conn: &Connection, slot_id: EntityId) -> Result<(), BookingError> {
    let locked = appointment_statuses_for_slot(conn, slot_id)?
        .iter()
        .any(|s| matches!(s, AppointmentStatus::Confirmed | AppointmentStatus::Completed));
    if locked {
        tracing::warn!(slot_id, "Refused change to a slot with a binding appointment");
        return Err(BookingError::State(format!(
            "Slot {slot_id} has a confirmed or completed appointment and cannot be changed"
        )));
    }
    Ok(())
}

pub fn create_slot(
    conn: &Connection,
    draft: &SlotDraft,
    today: NaiveDate,
) -> Result<Slot, BookingError> {
    with_transaction(conn, |tx| {
        validate_slot(tx, draft, None, today)?;
        let slot = insert_slot(tx, draft)?;
        tracing::info!(slot_id = slot.id, doctor_id = slot.doctor_id, date = %slot.date, "Slot created");
        Ok(slot)
    })
}

/// Update caller-owned fields of a slot. The stored busy flag is never
/// taken from `slot`; it is recomputed.
pub fn update_slot(conn: &Connection, slot: &Slot, today: NaiveDate) -> Result<(), BookingError> {
    with_transaction(conn, |tx| {
        require(get_slot(tx, slot.id)?, "Slot", slot.id)?;
        ensure_unlocked(tx, slot.id)?;

        let draft = slot.draft();
        validate_slot(tx, &draft, Some(slot.id), today)?;

        let active: Vec<Appointment> = list_appointments_for_slot(tx, slot.id)?
            .into_iter()
            .filter(|a| a.status.is_active())
            .collect();
        for appointment in &active {
            ensure_still_bookable(tx, slot, appointment)?;
        }

        update_slot_fields(tx, slot.id, &draft)?;

        for appointment in &active {
            let paid = paid_sum_for_appointment(tx, appointment.id, None)?;
            apply_payment_rule(tx, appointment.id, paid, slot.price)?;
        }
        recompute_busy(tx, slot.id)?;

        tracing::info!(slot_id = slot.id, "Slot updated");
        Ok(())
    })
}

/// An active appointment must stay valid against the edited slot.
fn ensure_still_bookable(
    conn: &Connection,
    slot: &Slot,
    appointment: &Appointment,
) -> Result<(), BookingError> {
    if appointment.doctor_id != slot.doctor_id {
        return Err(BookingError::Conflict(format!(
            "Appointment {} belongs to another doctor; slot doctor cannot change",
            appointment.id
        )));
    }
    if !slot.contains(appointment.scheduled_time) {
        return Err(BookingError::Conflict(format!(
            "Appointment {} at {} would fall outside the slot",
            appointment.id, appointment.scheduled_time
        )));
    }
    let paid = paid_sum_for_appointment(conn, appointment.id, None)?;
    if paid > slot.price {
        return Err(BookingError::Conflict(format!(
            "Appointment {} has already paid {paid}, above the new price {}",
            appointment.id, slot.price
        )));
    }
    Ok(())
}

/// Delete a slot. Absent slots are a no-op.
pub fn delete_slot(conn: &Connection, id: EntityId) -> Result<(), BookingError> {
    with_transaction(conn, |tx| {
        if get_slot(tx, id)?.is_none() {
            return Ok(());
        }
        ensure_unlocked(tx, id)?;
        crate::db::repository::delete_slot(tx, id)?;
        tracing::info!(slot_id = id, "Slot deleted");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::ErrorKind;
    use crate::db::repository::fixtures::{self, at, date, time};
    use crate::db::sqlite::open_memory_database;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn today() -> NaiveDate {
        date(2030, 1, 1)
    }

    fn draft(doctor_id: EntityId, start: u32, end: u32) -> SlotDraft {
        SlotDraft {
            doctor_id,
            date: date(2030, 1, 2),
            start_time: time(start, 0),
            end_time: time(end, 0),
            price: 1500,
        }
    }

    #[test]
    fn overlap_uses_half_open_intervals() {
        let nine_ten = (time(9, 0), time(10, 0));
        assert!(!intervals_overlap(nine_ten, (time(10, 0), time(11, 0))));
        assert!(!intervals_overlap((time(10, 0), time(11, 0)), nine_ten));
        assert!(intervals_overlap(nine_ten, (time(9, 30), time(10, 30))));
        assert!(intervals_overlap(nine_ten, (time(8, 0), time(12, 0))));
        assert!(intervals_overlap(nine_ten, nine_ten));
    }

    #[test]
    fn overlap_is_symmetric_over_random_pairs() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2000 {
            let mut pick = || {
                let a = rng.gen_range(0..24 * 60 - 1);
                let b = rng.gen_range(a + 1..24 * 60);
                (
                    NaiveTime::from_num_seconds_from_midnight_opt(a * 60, 0).unwrap(),
                    NaiveTime::from_num_seconds_from_midnight_opt(b * 60, 0).unwrap(),
                )
            };
            let x = pick();
            let y = pick();
            let expected = x.0 < y.1 && y.0 < x.1;
            assert_eq!(intervals_overlap(x, y), expected);
            assert_eq!(intervals_overlap(x, y), intervals_overlap(y, x));
        }
    }

    #[test]
    fn persisted_slots_never_overlap_over_random_requests() {
        let conn = open_memory_database().unwrap();
        let d = fixtures::doctor(&conn, "d@example.com");
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let start = rng.gen_range(0..23 * 4);
            let len = rng.gen_range(1..8);
            let end = (start + len).min(24 * 4 - 1);
            let candidate = SlotDraft {
                doctor_id: d.id,
                date: date(2030, 1, 2),
                start_time: NaiveTime::from_num_seconds_from_midnight_opt(start * 900, 0).unwrap(),
                end_time: NaiveTime::from_num_seconds_from_midnight_opt(end * 900, 0).unwrap(),
                price: 100,
            };
            let _ = create_slot(&conn, &candidate, today());
        }

        let slots = list_slots_for_doctor_date(&conn, d.id, date(2030, 1, 2)).unwrap();
        assert!(!slots.is_empty());
        for (i, a) in slots.iter().enumerate() {
            for b in &slots[i + 1..] {
                assert!(
                    !intervals_overlap((a.start_time, a.end_time), (b.start_time, b.end_time)),
                    "slots {} and {} overlap",
                    a.id,
                    b.id
                );
            }
        }
    }

    #[test]
    fn field_rules_reject_bad_input() {
        let mut d = draft(1, 10, 9);
        assert_eq!(check_slot_fields(&d, today()).unwrap_err().kind(), ErrorKind::Validation);

        d = draft(1, 9, 10);
        d.price = -5;
        assert_eq!(check_slot_fields(&d, today()).unwrap_err().kind(), ErrorKind::Validation);

        d = draft(1, 9, 10);
        d.date = date(2029, 12, 31);
        assert_eq!(check_slot_fields(&d, today()).unwrap_err().kind(), ErrorKind::Validation);

        d = draft(1, 9, 10);
        d.price = 0;
        d.date = today();
        assert!(check_slot_fields(&d, today()).is_ok());
    }

    #[test]
    fn create_rejects_overlap_and_unknown_doctor() {
        let conn = open_memory_database().unwrap();
        let doc = fixtures::doctor(&conn, "d@example.com");
        create_slot(&conn, &draft(doc.id, 9, 10), today()).unwrap();

        let clash = create_slot(&conn, &draft(doc.id, 9, 11), today()).unwrap_err();
        assert_eq!(clash.kind(), ErrorKind::Conflict);

        // Adjacent is fine.
        assert!(create_slot(&conn, &draft(doc.id, 10, 11), today()).is_ok());

        let missing = create_slot(&conn, &draft(999, 12, 13), today()).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn other_doctors_may_share_the_interval() {
        let conn = open_memory_database().unwrap();
        let d1 = fixtures::doctor(&conn, "d1@example.com");
        let d2 = fixtures::doctor(&conn, "d2@example.com");
        create_slot(&conn, &draft(d1.id, 9, 10), today()).unwrap();
        assert!(create_slot(&conn, &draft(d2.id, 9, 10), today()).is_ok());
    }

    #[test]
    fn update_may_keep_own_interval() {
        let conn = open_memory_database().unwrap();
        let doc = fixtures::doctor(&conn, "d@example.com");
        let mut slot = create_slot(&conn, &draft(doc.id, 9, 10), today()).unwrap();
        slot.end_time = time(10, 30);
        slot.price = 2000;
        update_slot(&conn, &slot, today()).unwrap();
        let stored = get_slot(&conn, slot.id).unwrap().unwrap();
        assert_eq!(stored.end_time, time(10, 30));
        assert_eq!(stored.price, 2000);
    }

    #[test]
    fn update_ignores_caller_busy_flag() {
        let conn = open_memory_database().unwrap();
        let doc = fixtures::doctor(&conn, "d@example.com");
        let mut slot = create_slot(&conn, &draft(doc.id, 9, 10), today()).unwrap();
        slot.is_busy = true;
        update_slot(&conn, &slot, today()).unwrap();
        assert!(!get_slot(&conn, slot.id).unwrap().unwrap().is_busy);
    }

    fn confirmed_slot(conn: &Connection) -> (Slot, Appointment) {
        let doc = fixtures::doctor(conn, "d@example.com");
        let p = fixtures::patient(conn, "p@example.com");
        let slot = create_slot(conn, &draft(doc.id, 9, 10), today()).unwrap();
        let a = insert_appointment(conn, &BookingRequest {
            doctor_id: doc.id,
            patient_id: p.id,
            slot_id: slot.id,
            scheduled_time: at(date(2030, 1, 2), 9, 30),
        })
        .unwrap();
        set_appointment_status(conn, a.id, AppointmentStatus::Confirmed).unwrap();
        (slot, a)
    }

    #[test]
    fn binding_appointment_locks_update_and_delete() {
        let conn = open_memory_database().unwrap();
        let (mut slot, _) = confirmed_slot(&conn);

        slot.price = 10;
        assert_eq!(update_slot(&conn, &slot, today()).unwrap_err().kind(), ErrorKind::State);
        assert_eq!(delete_slot(&conn, slot.id).unwrap_err().kind(), ErrorKind::State);
        assert!(get_slot(&conn, slot.id).unwrap().is_some());
    }

    #[test]
    fn update_refuses_to_strand_scheduled_appointment() {
        let conn = open_memory_database().unwrap();
        let (mut slot, a) = confirmed_slot(&conn);
        set_appointment_status(&conn, a.id, AppointmentStatus::Scheduled).unwrap();

        slot.start_time = time(9, 45);
        let err = update_slot(&conn, &slot, today()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(get_slot(&conn, slot.id).unwrap().unwrap().start_time, time(9, 0));
    }

    #[test]
    fn delete_is_idempotent_and_cascades_unbound_appointments() {
        let conn = open_memory_database().unwrap();
        let (slot, a) = confirmed_slot(&conn);
        set_appointment_status(&conn, a.id, AppointmentStatus::Cancelled).unwrap();

        delete_slot(&conn, slot.id).unwrap();
        assert!(get_slot(&conn, slot.id).unwrap().is_none());
        assert!(get_appointment(&conn, a.id).unwrap().is_none());
        delete_slot(&conn, slot.id).unwrap();
    }
}
