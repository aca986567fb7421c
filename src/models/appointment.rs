use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::AppointmentStatus;
use super::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: EntityId,
    pub doctor_id: EntityId,
    pub patient_id: EntityId,
    pub slot_id: EntityId,
    pub scheduled_time: NaiveDateTime,
    pub status: AppointmentStatus,
}

/// Booking request. There is no status field: new appointments always
/// start out Scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub doctor_id: EntityId,
    pub patient_id: EntityId,
    pub slot_id: EntityId,
    pub scheduled_time: NaiveDateTime,
}
