//! Booking and payment consistency core.
//!
//! Every public operation runs as one IMMEDIATE transaction over the
//! repository layer: validation first, then the primary write, then the
//! derived state (appointment status from the paid sum, slot busy flag
//! from active appointments). A failure anywhere rolls the whole unit back.

pub mod consistency;
pub mod error;
pub mod invariants;
pub mod ledger;
pub mod lifecycle;
pub mod occupancy;
pub mod orchestrator;
pub mod profiles;
pub mod slots;

pub use error::{BookingError, ErrorKind};
