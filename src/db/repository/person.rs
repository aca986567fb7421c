use chrono::NaiveDate;
use rusqlite::{params, Connection};

use super::optional;
use crate::db::DatabaseError;
use crate::models::*;

struct UserRow {
    id: EntityId,
    name: String,
    email: String,
    phone: String,
    role: i64,
}

impl UserRow {
    fn into_user(self) -> Result<User, DatabaseError> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            role: UserRole::from_code(self.role)?,
        })
    }
}

pub fn insert_user(conn: &Connection, user: &NewUser) -> Result<User, DatabaseError> {
    conn.execute(
        "INSERT INTO users (name, email, phone, role) VALUES (?1, ?2, ?3, ?4)",
        params![user.name, user.email, user.phone, user.role.as_code()],
    )?;
    Ok(User {
        id: conn.last_insert_rowid(),
        name: user.name.clone(),
        email: user.email.clone(),
        phone: user.phone.clone(),
        role: user.role,
    })
}

pub fn get_user(conn: &Connection, id: EntityId) -> Result<Option<User>, DatabaseError> {
    let row = optional(conn.query_row(
        "SELECT id, name, email, phone, role FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                phone: row.get(3)?,
                role: row.get(4)?,
            })
        },
    ))?;
    row.map(UserRow::into_user).transpose()
}

pub fn update_user(conn: &Connection, user: &User) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET name = ?1, email = ?2, phone = ?3, role = ?4 WHERE id = ?5",
        params![user.name, user.email, user.phone, user.role.as_code(), user.id],
    )?;
    Ok(changed)
}

pub fn count_users(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

pub fn insert_doctor(
    conn: &Connection,
    user_id: EntityId,
    specialization: &str,
) -> Result<Doctor, DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (user_id, specialization) VALUES (?1, ?2)",
        params![user_id, specialization],
    )?;
    Ok(Doctor {
        id: conn.last_insert_rowid(),
        user_id,
        specialization: specialization.to_string(),
    })
}

pub fn get_doctor(conn: &Connection, id: EntityId) -> Result<Option<Doctor>, DatabaseError> {
    optional(conn.query_row(
        "SELECT id, user_id, specialization FROM doctors WHERE id = ?1",
        params![id],
        |row| {
            Ok(Doctor {
                id: row.get(0)?,
                user_id: row.get(1)?,
                specialization: row.get(2)?,
            })
        },
    ))
}

pub fn insert_patient(
    conn: &Connection,
    user_id: EntityId,
    date_of_birth: NaiveDate,
) -> Result<Patient, DatabaseError> {
    conn.execute(
        "INSERT INTO patients (user_id, date_of_birth) VALUES (?1, ?2)",
        params![user_id, date_of_birth],
    )?;
    Ok(Patient {
        id: conn.last_insert_rowid(),
        user_id,
        date_of_birth,
    })
}

pub fn get_patient(conn: &Connection, id: EntityId) -> Result<Option<Patient>, DatabaseError> {
    optional(conn.query_row(
        "SELECT id, user_id, date_of_birth FROM patients WHERE id = ?1",
        params![id],
        |row| {
            Ok(Patient {
                id: row.get(0)?,
                user_id: row.get(1)?,
                date_of_birth: row.get(2)?,
            })
        },
    ))
}
