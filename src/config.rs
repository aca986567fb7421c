use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Slotbook";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default refund notice window, in hours before the slot starts.
pub const DEFAULT_REFUND_CUTOFF_HOURS: i64 = 2;

const REFUND_CUTOFF_ENV: &str = "SLOTBOOK_REFUND_CUTOFF_HOURS";

/// Get the application data directory (~/.local/share/slotbook on Linux).
/// Falls back to the working directory when the platform has no data dir.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slotbook")
}

/// Default location of the booking database.
pub fn database_path() -> PathBuf {
    app_data_dir().join("slotbook.db")
}

/// Default location of the JSON policy file.
pub fn policy_path() -> PathBuf {
    app_data_dir().join("policy.json")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "slotbook_lib=info,warn"
}

/// Tunable booking rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingPolicy {
    /// Cancellations with less notice than this keep their payments.
    pub refund_cutoff_hours: i64,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            refund_cutoff_hours: DEFAULT_REFUND_CUTOFF_HOURS,
        }
    }
}

impl BookingPolicy {
    pub fn refund_cutoff(&self) -> chrono::Duration {
        chrono::Duration::hours(self.refund_cutoff_hours)
    }

    /// Default policy with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Policy file at `policy_path()`, then environment overrides.
    pub fn load() -> Self {
        Self::load_or_default(&policy_path()).with_env_overrides()
    }

    /// `SLOTBOOK_REFUND_CUTOFF_HOURS` replaces the cutoff when it holds a
    /// non-negative integer.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(REFUND_CUTOFF_ENV) {
            self.apply_cutoff_override(&raw);
        }
        self
    }

    fn apply_cutoff_override(&mut self, raw: &str) {
        match raw.trim().parse::<i64>() {
            Ok(hours) if hours >= 0 => self.refund_cutoff_hours = hours,
            _ => tracing::warn!(value = %raw, "Ignoring invalid {REFUND_CUTOFF_ENV}"),
        }
    }

    /// Read a JSON policy file, falling back to defaults when it is missing
    /// or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Self>(&text) {
                Ok(policy) if policy.refund_cutoff_hours >= 0 => policy,
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "Negative refund cutoff, using defaults");
                    Self::default()
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Malformed policy file, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}
