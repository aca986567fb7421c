//! Booking service: the single entry point a transport layer talks to.
//!
//! Owns the connection, the booking policy and the clock, and forwards
//! every operation to `crate::booking` with "now" filled in.

use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;

use crate::booking::consistency::{self, ConsistencyReport};
use crate::booking::{lifecycle, orchestrator, profiles, slots, BookingError};
use crate::clock::{Clock, SystemClock};
use crate::config::{self, BookingPolicy};
use crate::db::{self, repository, DatabaseError};
use crate::models::*;

/// Demo doctors: name, email, phone, specialization.
const DEMO_DOCTORS: &[(&str, &str, &str, &str)] = &[
    ("Doctor 1", "doctor1@example.com", "+77000000001", "Therapist"),
    ("Doctor 2", "doctor2@example.com", "+77000000002", "Cardiologist"),
];

/// Demo patients: name, email, phone, date of birth.
const DEMO_PATIENTS: &[(&str, &str, &str, (i32, u32, u32))] = &[
    ("Patient 1", "patient1@example.com", "+77000000003", (1990, 1, 1)),
    ("Patient 2", "patient2@example.com", "+77000000004", (1995, 5, 5)),
];

/// Tomorrow's demo slots: doctor index, start hour (one hour long), price.
const DEMO_SLOTS: &[(usize, u32, Money)] = &[(0, 9, 1500), (0, 10, 1200), (1, 9, 2000), (1, 10, 1800)];

/// Demo bookings at the slot start, paid in full: patient index, slot index.
const DEMO_BOOKINGS: &[(usize, usize)] = &[(0, 0), (1, 2)];

fn demo_time(hour: u32) -> Result<NaiveTime, BookingError> {
    NaiveTime::from_hms_opt(hour, 0, 0)
        .ok_or_else(|| BookingError::Validation(format!("Invalid demo hour {hour}")))
}

pub struct BookingService<C: Clock = SystemClock> {
    conn: Connection,
    policy: BookingPolicy,
    clock: C,
}

impl BookingService<SystemClock> {
    /// Open (creating if needed) the database at `path` with the policy
    /// taken from the environment.
    pub fn open(path: &Path) -> Result<Self, BookingError> {
        let conn = db::open_database(path)?;
        tracing::info!(path = %path.display(), version = config::APP_VERSION, "Booking database opened");
        Ok(Self::with_clock(conn, BookingPolicy::from_env(), SystemClock))
    }

    /// Open the database under the application data directory, with the
    /// policy file and environment overrides applied.
    pub fn open_default() -> Result<Self, BookingError> {
        std::fs::create_dir_all(config::app_data_dir()).map_err(DatabaseError::from)?;
        let conn = db::open_database(&config::database_path())?;
        Ok(Self::with_clock(conn, BookingPolicy::load(), SystemClock))
    }

    pub fn open_in_memory() -> Result<Self, BookingError> {
        let conn = db::open_memory_database()?;
        Ok(Self::with_clock(conn, BookingPolicy::default(), SystemClock))
    }
}

impl<C: Clock> BookingService<C> {
    pub fn with_clock(conn: Connection, policy: BookingPolicy, clock: C) -> Self {
        Self { conn, policy, clock }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ── Profiles ──────────────────────────────────────────

    pub fn create_user(&self, user: &NewUser) -> Result<User, BookingError> {
        profiles::create_user(&self.conn, user)
    }

    pub fn update_user(&self, user: &User) -> Result<(), BookingError> {
        profiles::update_user(&self.conn, user)
    }

    pub fn create_doctor(&self, user_id: EntityId, specialization: &str) -> Result<Doctor, BookingError> {
        profiles::create_doctor(&self.conn, user_id, specialization)
    }

    pub fn create_patient(&self, user_id: EntityId, date_of_birth: NaiveDate) -> Result<Patient, BookingError> {
        profiles::create_patient(&self.conn, user_id, date_of_birth, self.clock.today())
    }

    // ── Slots ─────────────────────────────────────────────

    pub fn create_slot(&self, draft: &SlotDraft) -> Result<Slot, BookingError> {
        slots::create_slot(&self.conn, draft, self.clock.today())
    }

    pub fn update_slot(&self, slot: &Slot) -> Result<(), BookingError> {
        slots::update_slot(&self.conn, slot, self.clock.today())
    }

    pub fn delete_slot(&self, id: EntityId) -> Result<(), BookingError> {
        slots::delete_slot(&self.conn, id)
    }

    pub fn get_slot(&self, id: EntityId) -> Result<Option<Slot>, BookingError> {
        Ok(repository::get_slot(&self.conn, id)?)
    }

    pub fn list_slots_for_doctor(&self, doctor_id: EntityId) -> Result<Vec<Slot>, BookingError> {
        Ok(repository::list_slots_for_doctor(&self.conn, doctor_id)?)
    }

    // ── Appointments ──────────────────────────────────────

    pub fn create_appointment(&self, request: &BookingRequest) -> Result<Appointment, BookingError> {
        lifecycle::create_appointment(&self.conn, request, self.clock.now())
    }

    pub fn update_appointment(&self, appointment: &Appointment) -> Result<(), BookingError> {
        lifecycle::update_appointment(&self.conn, appointment, self.clock.now(), &self.policy)
    }

    pub fn cancel_appointment(&self, id: EntityId) -> Result<(), BookingError> {
        lifecycle::change_status(&self.conn, id, AppointmentStatus::Cancelled, self.clock.now(), &self.policy)
    }

    pub fn complete_appointment(&self, id: EntityId) -> Result<(), BookingError> {
        lifecycle::change_status(&self.conn, id, AppointmentStatus::Completed, self.clock.now(), &self.policy)
    }

    pub fn delete_appointment(&self, id: EntityId) -> Result<(), BookingError> {
        lifecycle::delete_appointment(&self.conn, id)
    }

    pub fn get_appointment(&self, id: EntityId) -> Result<Option<Appointment>, BookingError> {
        Ok(repository::get_appointment(&self.conn, id)?)
    }

    // ── Payments ──────────────────────────────────────────

    /// Record a payment and return the appointment's new paid sum.
    pub fn create_payment(&self, payment: &NewPayment) -> Result<Money, BookingError> {
        let (_, paid) = orchestrator::create_payment(&self.conn, payment, self.clock.now())?;
        Ok(paid)
    }

    /// Like `create_payment`, also returning the stored record.
    pub fn record_payment(&self, payment: &NewPayment) -> Result<(Payment, Money), BookingError> {
        orchestrator::create_payment(&self.conn, payment, self.clock.now())
    }

    pub fn update_payment(&self, payment: &Payment) -> Result<Money, BookingError> {
        orchestrator::update_payment(&self.conn, payment)
    }

    /// `None` when the payment was already gone.
    pub fn delete_payment(&self, id: EntityId) -> Result<Option<Money>, BookingError> {
        orchestrator::delete_payment(&self.conn, id)
    }

    pub fn get_payment(&self, id: EntityId) -> Result<Option<Payment>, BookingError> {
        Ok(repository::get_payment(&self.conn, id)?)
    }

    pub fn list_payments_for_appointment(&self, appointment_id: EntityId) -> Result<Vec<Payment>, BookingError> {
        Ok(repository::list_payments_for_appointment(&self.conn, appointment_id)?)
    }

    pub fn paid_sum(&self, appointment_id: EntityId) -> Result<Money, BookingError> {
        Ok(repository::paid_sum_for_appointment(&self.conn, appointment_id, None)?)
    }

    // ── Maintenance ───────────────────────────────────────

    pub fn check_consistency(&self) -> Result<ConsistencyReport, BookingError> {
        consistency::check_consistency(&self.conn)
    }

    pub fn repair_consistency(&self) -> Result<usize, BookingError> {
        consistency::repair_consistency(&self.conn)
    }

    /// Populate an empty database with two doctors, two patients, four
    /// slots for tomorrow and two fully paid bookings.
    ///
    /// Does nothing when any user exists. Returns whether data was written.
    /// Each record goes through the regular operation, so a failure part
    /// way leaves the earlier records in place.
    pub fn seed_demo_data(&self) -> Result<bool, BookingError> {
        if repository::count_users(&self.conn)? > 0 {
            tracing::debug!("Users present, demo data skipped");
            return Ok(false);
        }
        let tomorrow = self
            .clock
            .today()
            .succ_opt()
            .ok_or_else(|| BookingError::Validation("No date after today".into()))?;

        let mut doctors = Vec::with_capacity(DEMO_DOCTORS.len());
        for &(name, email, phone, specialization) in DEMO_DOCTORS {
            let user = self.create_user(&NewUser {
                name: name.into(),
                email: email.into(),
                phone: phone.into(),
                role: UserRole::Doctor,
            })?;
            doctors.push(self.create_doctor(user.id, specialization)?);
        }

        let mut patients = Vec::with_capacity(DEMO_PATIENTS.len());
        for &(name, email, phone, (y, m, d)) in DEMO_PATIENTS {
            let user = self.create_user(&NewUser {
                name: name.into(),
                email: email.into(),
                phone: phone.into(),
                role: UserRole::Patient,
            })?;
            let dob = NaiveDate::from_ymd_opt(y, m, d)
                .ok_or_else(|| BookingError::Validation(format!("Invalid demo birth date {y}-{m}-{d}")))?;
            patients.push(self.create_patient(user.id, dob)?);
        }

        let mut slots = Vec::with_capacity(DEMO_SLOTS.len());
        for &(doctor, hour, price) in DEMO_SLOTS {
            slots.push(self.create_slot(&SlotDraft {
                doctor_id: doctors[doctor].id,
                date: tomorrow,
                start_time: demo_time(hour)?,
                end_time: demo_time(hour + 1)?,
                price,
            })?);
        }

        for &(patient, slot) in DEMO_BOOKINGS {
            let slot = &slots[slot];
            let appointment = self.create_appointment(&BookingRequest {
                doctor_id: slot.doctor_id,
                patient_id: patients[patient].id,
                slot_id: slot.id,
                scheduled_time: slot.starts_at(),
            })?;
            self.create_payment(&NewPayment {
                appointment_id: appointment.id,
                amount: slot.price,
                status: PaymentStatus::Paid,
            })?;
        }

        tracing::info!(
            doctors = doctors.len(),
            patients = patients.len(),
            slots = slots.len(),
            bookings = DEMO_BOOKINGS.len(),
            date = %tomorrow,
            "Demo data seeded"
        );
        Ok(true)
    }
}
