use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};

use super::optional;
use crate::db::DatabaseError;
use crate::models::*;

const APPOINTMENT_COLUMNS: &str = "id, doctor_id, patient_id, slot_id, scheduled_time, status";

struct AppointmentRow {
    id: EntityId,
    doctor_id: EntityId,
    patient_id: EntityId,
    slot_id: EntityId,
    scheduled_time: NaiveDateTime,
    status: i64,
}

impl AppointmentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            doctor_id: row.get(1)?,
            patient_id: row.get(2)?,
            slot_id: row.get(3)?,
            scheduled_time: row.get(4)?,
            status: row.get(5)?,
        })
    }

    fn into_appointment(self) -> Result<Appointment, DatabaseError> {
        Ok(Appointment {
            id: self.id,
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            slot_id: self.slot_id,
            scheduled_time: self.scheduled_time,
            status: AppointmentStatus::from_code(self.status)?,
        })
    }
}

/// Insert a booking. The row always starts out Scheduled.
pub fn insert_appointment(
    conn: &Connection,
    request: &BookingRequest,
) -> Result<Appointment, DatabaseError> {
    let status = AppointmentStatus::Scheduled;
    conn.execute(
        "INSERT INTO appointments (doctor_id, patient_id, slot_id, scheduled_time, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            request.doctor_id,
            request.patient_id,
            request.slot_id,
            request.scheduled_time,
            status.as_code(),
        ],
    )?;
    Ok(Appointment {
        id: conn.last_insert_rowid(),
        doctor_id: request.doctor_id,
        patient_id: request.patient_id,
        slot_id: request.slot_id,
        scheduled_time: request.scheduled_time,
        status,
    })
}

pub fn get_appointment(
    conn: &Connection,
    id: EntityId,
) -> Result<Option<Appointment>, DatabaseError> {
    let row = optional(conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id],
        AppointmentRow::from_row,
    ))?;
    row.map(AppointmentRow::into_appointment).transpose()
}

/// Persist every column of an appointment, status included.
pub fn update_appointment_row(
    conn: &Connection,
    appointment: &Appointment,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments
         SET doctor_id = ?1, patient_id = ?2, slot_id = ?3, scheduled_time = ?4, status = ?5
         WHERE id = ?6",
        params![
            appointment.doctor_id,
            appointment.patient_id,
            appointment.slot_id,
            appointment.scheduled_time,
            appointment.status.as_code(),
            appointment.id,
        ],
    )?;
    Ok(changed)
}

pub fn set_appointment_status(
    conn: &Connection,
    id: EntityId,
    status: AppointmentStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET status = ?1 WHERE id = ?2",
        params![status.as_code(), id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Appointment".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_appointment_row(conn: &Connection, id: EntityId) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM appointments WHERE id = ?1", params![id])?)
}

pub fn list_appointments_for_slot(
    conn: &Connection,
    slot_id: EntityId,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE slot_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![slot_id], AppointmentRow::from_row)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(row?.into_appointment()?);
    }
    Ok(appointments)
}

pub fn list_all_appointments(conn: &Connection) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments ORDER BY id"
    ))?;
    let rows = stmt.query_map([], AppointmentRow::from_row)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(row?.into_appointment()?);
    }
    Ok(appointments)
}

/// Statuses of every appointment referencing the slot.
pub fn appointment_statuses_for_slot(
    conn: &Connection,
    slot_id: EntityId,
) -> Result<Vec<AppointmentStatus>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT status FROM appointments WHERE slot_id = ?1")?;
    let codes = stmt.query_map(params![slot_id], |row| row.get::<_, i64>(0))?;

    let mut statuses = Vec::new();
    for code in codes {
        statuses.push(AppointmentStatus::from_code(code?)?);
    }
    Ok(statuses)
}

/// Whether the patient already holds an active appointment on the slot,
/// ignoring `excluding` (the appointment being updated).
pub fn patient_has_active_appointment(
    conn: &Connection,
    patient_id: EntityId,
    slot_id: EntityId,
    excluding: Option<EntityId>,
) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (
             SELECT 1 FROM appointments
             WHERE patient_id = ?1 AND slot_id = ?2 AND status IN (?3, ?4)
               AND (?5 IS NULL OR id != ?5)
         )",
        params![
            patient_id,
            slot_id,
            AppointmentStatus::Scheduled.as_code(),
            AppointmentStatus::Confirmed.as_code(),
            excluding,
        ],
        |row| row.get(0),
    )?;
    Ok(exists)
}
