use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{EntityId, Money};

/// A doctor's bookable interval on one date.
///
/// `is_busy` is a projection of the slot's appointments; callers never set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: EntityId,
    pub doctor_id: EntityId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price: Money,
    pub is_busy: bool,
}

impl Slot {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }

    /// Whether `at` lies on the slot's date within `[start, end]`.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.starts_at() && at <= self.ends_at()
    }

    pub fn draft(&self) -> SlotDraft {
        SlotDraft {
            doctor_id: self.doctor_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            price: self.price,
        }
    }
}

/// Caller-supplied slot fields, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDraft {
    pub doctor_id: EntityId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price: Money,
}
