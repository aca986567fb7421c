//! Slot busy flag as a projection of the slot's appointments.

use rusqlite::Connection;

use super::BookingError;
use crate::db::repository::{appointment_statuses_for_slot, get_slot, set_slot_busy};
use crate::models::{AppointmentStatus, EntityId};

/// A slot is busy iff at least one of its appointments is active.
pub fn derive_busy<'a, I>(statuses: I) -> bool
where
    I: IntoIterator<Item = &'a AppointmentStatus>,
{
    statuses.into_iter().any(AppointmentStatus::is_active)
}

/// Recompute and store the busy flag of a slot. Returns the new value.
///
/// A slot that no longer exists (deleted in the same unit) is skipped.
pub fn recompute_busy(conn: &Connection, slot_id: EntityId) -> Result<bool, BookingError> {
    let Some(slot) = get_slot(conn, slot_id)? else {
        return Ok(false);
    };
    let statuses = appointment_statuses_for_slot(conn, slot_id)?;
    let busy = derive_busy(&statuses);
    if slot.is_busy != busy {
        set_slot_busy(conn, slot_id, busy)?;
        tracing::debug!(slot_id, busy, "Slot busy flag recomputed");
    }
    Ok(busy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{self, at, date};
    use crate::db::repository::{insert_appointment, set_appointment_status};
    use crate::db::sqlite::open_memory_database;
    use crate::models::BookingRequest;

    #[test]
    fn derive_busy_truth_table() {
        use AppointmentStatus::*;
        assert!(!derive_busy(&[]));
        assert!(derive_busy(&[Scheduled]));
        assert!(derive_busy(&[Cancelled, Confirmed]));
        assert!(!derive_busy(&[Cancelled, Completed]));
    }

    #[test]
    fn recompute_follows_appointment_status() {
        let conn = open_memory_database().unwrap();
        let d = fixtures::doctor(&conn, "d@example.com");
        let p = fixtures::patient(&conn, "p@example.com");
        let s = fixtures::slot(&conn, d.id, date(2030, 1, 2), 9, 10, 100);
        let a = insert_appointment(&conn, &BookingRequest {
            doctor_id: d.id,
            patient_id: p.id,
            slot_id: s.id,
            scheduled_time: at(date(2030, 1, 2), 9, 0),
        })
        .unwrap();

        assert!(recompute_busy(&conn, s.id).unwrap());
        assert!(get_slot(&conn, s.id).unwrap().unwrap().is_busy);

        set_appointment_status(&conn, a.id, AppointmentStatus::Cancelled).unwrap();
        assert!(!recompute_busy(&conn, s.id).unwrap());
        assert!(!get_slot(&conn, s.id).unwrap().unwrap().is_busy);
    }

    #[test]
    fn recompute_on_missing_slot_is_noop() {
        let conn = open_memory_database().unwrap();
        assert!(!recompute_busy(&conn, 404).unwrap());
    }
}
