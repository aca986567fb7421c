pub mod booking;
pub mod clock;
pub mod config;
pub mod db;
pub mod models;
pub mod service;

use tracing_subscriber::EnvFilter;

pub use booking::{BookingError, ErrorKind};
pub use service::BookingService;

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// built-in filter. Calling it twice is harmless.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} core starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
