//! Logging setup for the camopt binaries.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the executable. Default level is INFO, overridable through `RUST_LOG`:
//!
//! ```bash
//! RUST_LOG=camopt_rs=debug cargo run --bin camopt-refine
//! ```

use tracing::Level;

/// Install the standard subscriber at INFO level.
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Install the standard subscriber with a custom default level.
///
/// Calling this twice is harmless: the second install attempt is ignored.
pub fn init_logger_with_level(default_level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}
