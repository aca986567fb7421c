use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::PaymentStatus;
use super::{EntityId, Money};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: EntityId,
    pub appointment_id: EntityId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub payment_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub appointment_id: EntityId,
    pub amount: Money,
    pub status: PaymentStatus,
}
