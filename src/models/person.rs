use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::UserRole;
use super::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: UserRole,
}

/// A doctor profile backed by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: EntityId,
    pub user_id: EntityId,
    pub specialization: String,
}

/// A patient profile backed by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: EntityId,
    pub user_id: EntityId,
    pub date_of_birth: NaiveDate,
}
