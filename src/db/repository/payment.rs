use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};

use super::optional;
use crate::db::DatabaseError;
use crate::models::*;

const PAYMENT_COLUMNS: &str = "id, appointment_id, amount, status, payment_date";

struct PaymentRow {
    id: EntityId,
    appointment_id: EntityId,
    amount: Money,
    status: i64,
    payment_date: NaiveDateTime,
}

impl PaymentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            appointment_id: row.get(1)?,
            amount: row.get(2)?,
            status: row.get(3)?,
            payment_date: row.get(4)?,
        })
    }

    fn into_payment(self) -> Result<Payment, DatabaseError> {
        Ok(Payment {
            id: self.id,
            appointment_id: self.appointment_id,
            amount: self.amount,
            status: PaymentStatus::from_code(self.status)?,
            payment_date: self.payment_date,
        })
    }
}

pub fn insert_payment(
    conn: &Connection,
    payment: &NewPayment,
    payment_date: NaiveDateTime,
) -> Result<Payment, DatabaseError> {
    conn.execute(
        "INSERT INTO payments (appointment_id, amount, status, payment_date)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            payment.appointment_id,
            payment.amount,
            payment.status.as_code(),
            payment_date,
        ],
    )?;
    Ok(Payment {
        id: conn.last_insert_rowid(),
        appointment_id: payment.appointment_id,
        amount: payment.amount,
        status: payment.status,
        payment_date,
    })
}

pub fn get_payment(conn: &Connection, id: EntityId) -> Result<Option<Payment>, DatabaseError> {
    let row = optional(conn.query_row(
        &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
        params![id],
        PaymentRow::from_row,
    ))?;
    row.map(PaymentRow::into_payment).transpose()
}

pub fn update_payment_row(conn: &Connection, payment: &Payment) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE payments SET appointment_id = ?1, amount = ?2, status = ?3, payment_date = ?4
         WHERE id = ?5",
        params![
            payment.appointment_id,
            payment.amount,
            payment.status.as_code(),
            payment.payment_date,
            payment.id,
        ],
    )?;
    Ok(changed)
}

pub fn delete_payment_row(conn: &Connection, id: EntityId) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM payments WHERE id = ?1", params![id])?)
}

pub fn list_payments_for_appointment(
    conn: &Connection,
    appointment_id: EntityId,
) -> Result<Vec<Payment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE appointment_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![appointment_id], PaymentRow::from_row)?;

    let mut payments = Vec::new();
    for row in rows {
        payments.push(row?.into_payment()?);
    }
    Ok(payments)
}

/// Sum of Paid amounts for an appointment, leaving out `excluding`.
pub fn paid_sum_for_appointment(
    conn: &Connection,
    appointment_id: EntityId,
    excluding: Option<EntityId>,
) -> Result<Money, DatabaseError> {
    let sum: Money = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments
         WHERE appointment_id = ?1 AND status = ?2 AND (?3 IS NULL OR id != ?3)",
        params![appointment_id, PaymentStatus::Paid.as_code(), excluding],
        |row| row.get(0),
    )?;
    Ok(sum)
}

/// Whether a different patient holds a Paid payment on any appointment
/// for the slot. `excluding` leaves out the payment being replaced.
pub fn other_patient_paid_on_slot(
    conn: &Connection,
    slot_id: EntityId,
    patient_id: EntityId,
    excluding: Option<EntityId>,
) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (
             SELECT 1 FROM payments p
             JOIN appointments a ON a.id = p.appointment_id
             WHERE a.slot_id = ?1 AND a.patient_id != ?2 AND p.status = ?3
               AND (?4 IS NULL OR p.id != ?4)
         )",
        params![slot_id, patient_id, PaymentStatus::Paid.as_code(), excluding],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Whether a Paid payment on the slot belongs to a patient other than
/// `patient_id`, ignoring every payment of `excluding_appointment`.
pub fn other_booking_paid_on_slot(
    conn: &Connection,
    slot_id: EntityId,
    patient_id: EntityId,
    excluding_appointment: EntityId,
) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (
             SELECT 1 FROM payments p
             JOIN appointments a ON a.id = p.appointment_id
             WHERE a.slot_id = ?1 AND a.patient_id != ?2 AND p.status = ?3
               AND a.id != ?4
         )",
        params![slot_id, patient_id, PaymentStatus::Paid.as_code(), excluding_appointment],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Flip every Paid payment of the appointment to Refunded.
pub fn mark_payments_refunded(
    conn: &Connection,
    appointment_id: EntityId,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE payments SET status = ?1 WHERE appointment_id = ?2 AND status = ?3",
        params![
            PaymentStatus::Refunded.as_code(),
            appointment_id,
            PaymentStatus::Paid.as_code(),
        ],
    )?;
    Ok(changed)
}
