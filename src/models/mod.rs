pub mod appointment;
pub mod enums;
pub mod payment;
pub mod person;
pub mod slot;

pub use appointment::*;
pub use enums::*;
pub use payment::*;
pub use person::*;
pub use slot::*;

/// Opaque row identifier shared by every entity.
pub type EntityId = i64;

/// Amount of money in minor currency units.
pub type Money = i64;
