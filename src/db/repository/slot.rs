use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

use super::optional;
use crate::db::DatabaseError;
use crate::models::*;

const SLOT_COLUMNS: &str = "id, doctor_id, date, start_time, end_time, price, is_busy";

fn slot_from_row(row: &Row<'_>) -> rusqlite::Result<Slot> {
    Ok(Slot {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        date: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        price: row.get(5)?,
        is_busy: row.get::<_, i32>(6)? != 0,
    })
}

/// Insert a slot. New slots are never busy.
pub fn insert_slot(conn: &Connection, draft: &SlotDraft) -> Result<Slot, DatabaseError> {
    conn.execute(
        "INSERT INTO slots (doctor_id, date, start_time, end_time, price, is_busy)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        params![draft.doctor_id, draft.date, draft.start_time, draft.end_time, draft.price],
    )?;
    Ok(Slot {
        id: conn.last_insert_rowid(),
        doctor_id: draft.doctor_id,
        date: draft.date,
        start_time: draft.start_time,
        end_time: draft.end_time,
        price: draft.price,
        is_busy: false,
    })
}

pub fn get_slot(conn: &Connection, id: EntityId) -> Result<Option<Slot>, DatabaseError> {
    optional(conn.query_row(
        &format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?1"),
        params![id],
        slot_from_row,
    ))
}

/// Overwrite caller-owned slot fields. `is_busy` is left untouched.
pub fn update_slot_fields(
    conn: &Connection,
    id: EntityId,
    draft: &SlotDraft,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE slots SET doctor_id = ?1, date = ?2, start_time = ?3, end_time = ?4, price = ?5
         WHERE id = ?6",
        params![draft.doctor_id, draft.date, draft.start_time, draft.end_time, draft.price, id],
    )?;
    Ok(changed)
}

pub fn set_slot_busy(conn: &Connection, id: EntityId, busy: bool) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE slots SET is_busy = ?1 WHERE id = ?2",
        params![busy as i32, id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Slot".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_slot(conn: &Connection, id: EntityId) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM slots WHERE id = ?1", params![id])?)
}

/// Slots of one doctor on one date, ordered by start time.
pub fn list_slots_for_doctor_date(
    conn: &Connection,
    doctor_id: EntityId,
    date: NaiveDate,
) -> Result<Vec<Slot>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots
         WHERE doctor_id = ?1 AND date = ?2
         ORDER BY start_time ASC"
    ))?;
    let rows = stmt.query_map(params![doctor_id, date], slot_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn list_slots_for_doctor(
    conn: &Connection,
    doctor_id: EntityId,
) -> Result<Vec<Slot>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots
         WHERE doctor_id = ?1
         ORDER BY date ASC, start_time ASC"
    ))?;
    let rows = stmt.query_map(params![doctor_id], slot_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn list_all_slots(conn: &Connection) -> Result<Vec<Slot>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots ORDER BY doctor_id, date, start_time"
    ))?;
    let rows = stmt.query_map([], slot_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
