use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_code + from_code for integer-coded columns
macro_rules! code_enum {
    ($name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_code(&self) -> i64 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            pub fn from_code(code: i64) -> Result<Self, DatabaseError> {
                match code {
                    $($code => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: code.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(self, f)
            }
        }
    };
}

code_enum!(UserRole {
    Patient => 0,
    Doctor => 1,
    Admin => 2,
});

code_enum!(AppointmentStatus {
    Scheduled => 0,
    Confirmed => 1,
    Cancelled => 2,
    Completed => 3,
});

code_enum!(PaymentStatus {
    Paid => 0,
    Refunded => 1,
});

impl AppointmentStatus {
    /// Scheduled and Confirmed appointments hold their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }
}
