use rusqlite::Connection;

use super::lifecycle::{apply_payment_rule, auto_transition};
use super::occupancy::{derive_busy, recompute_busy};
use super::slots::intervals_overlap;
use super::BookingError;
use crate::db::repository::*;
use crate::db::with_transaction;
use crate::models::*;

/// A single consistency issue detected by the checker.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConsistencyIssue {
    pub category: String,
    pub severity: String,
    pub description: String,
    pub slot_id: Option<EntityId>,
    pub appointment_id: Option<EntityId>,
}

/// Result of a consistency check over slots, appointments and payments.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsistencyReport {
    pub issues: Vec<ConsistencyIssue>,
    pub slots_checked: usize,
    pub appointments_checked: usize,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Run a full consistency check across the booking tables.
///
/// Detects:
/// - Busy flags that disagree with the slot's appointments
/// - Confirmed appointments whose paid sum fell below the price
/// - Scheduled appointments already paid in full (priced slots only)
/// - Overlapping slots of the same doctor on the same date
pub fn check_consistency(conn: &Connection) -> Result<ConsistencyReport, BookingError> {
    let mut issues = Vec::new();
    let slots = list_all_slots(conn)?;
    let appointments = list_all_appointments(conn)?;

    // 1. Busy drift
    for slot in &slots {
        let statuses: Vec<AppointmentStatus> = appointments
            .iter()
            .filter(|a| a.slot_id == slot.id)
            .map(|a| a.status)
            .collect();
        let derived = derive_busy(&statuses);
        if derived != slot.is_busy {
            issues.push(ConsistencyIssue {
                category: "busy_drift".into(),
                severity: "medium".into(),
                description: format!("Stored busy={} but appointments say {derived}", slot.is_busy),
                slot_id: Some(slot.id),
                appointment_id: None,
            });
        }
    }

    // 2./3. Status out of step with payments
    for appointment in &appointments {
        let Some(slot) = slots.iter().find(|s| s.id == appointment.slot_id) else {
            continue;
        };
        let paid = paid_sum_for_appointment(conn, appointment.id, None)?;
        let description = match auto_transition(appointment.status, paid, slot.price) {
            Some(AppointmentStatus::Scheduled) => {
                format!("Confirmed with only {paid} of {} paid", slot.price)
            }
            Some(_) if slot.price > 0 => {
                format!("Scheduled although {paid} of {} is paid", slot.price)
            }
            _ => continue,
        };
        issues.push(ConsistencyIssue {
            category: "status_drift".into(),
            severity: "high".into(),
            description,
            slot_id: Some(slot.id),
            appointment_id: Some(appointment.id),
        });
    }

    // 4. Overlapping slots
    for (i, a) in slots.iter().enumerate() {
        for b in &slots[i + 1..] {
            if a.doctor_id == b.doctor_id
                && a.date == b.date
                && intervals_overlap((a.start_time, a.end_time), (b.start_time, b.end_time))
            {
                issues.push(ConsistencyIssue {
                    category: "slot_overlap".into(),
                    severity: "high".into(),
                    description: format!("Slots {} and {} overlap on {}", a.id, b.id, a.date),
                    slot_id: Some(a.id),
                    appointment_id: None,
                });
            }
        }
    }

    Ok(ConsistencyReport {
        issues,
        slots_checked: slots.len(),
        appointments_checked: appointments.len(),
    })
}

/// Auto-repair the issues that have a single correct answer.
///
/// Re-applies the payment rule to every active appointment, then
/// recomputes every busy flag. Overlaps are left for a human.
/// Returns the number of rows repaired.
pub fn repair_consistency(conn: &Connection) -> Result<usize, BookingError> {
    with_transaction(conn, |tx| {
        let mut repaired = 0;

        for appointment in list_all_appointments(tx)? {
            if !appointment.status.is_active() {
                continue;
            }
            let Some(slot) = get_slot(tx, appointment.slot_id)? else {
                continue;
            };
            let paid = paid_sum_for_appointment(tx, appointment.id, None)?;
            if slot.price == 0 && appointment.status == AppointmentStatus::Scheduled {
                continue;
            }
            if apply_payment_rule(tx, appointment.id, paid, slot.price)? != appointment.status {
                repaired += 1;
            }
        }

        for slot in list_all_slots(tx)? {
            if recompute_busy(tx, slot.id)? != slot.is_busy {
                tracing::info!(slot_id = slot.id, "Repaired busy flag drift");
                repaired += 1;
            }
        }

        if repaired > 0 {
            tracing::info!(count = repaired, "Consistency repair applied");
        }
        Ok(repaired)
    })
}
