//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Streaming decisions are logged at `debug`, per-slot detail at `trace`.
/// Override with RUST_LOG, e.g. `RUST_LOG=hairpeel::streaming=debug`.
///
/// # Example
/// ```
/// hairpeel::core::logging::init();
/// log::info!("Renderer started");
/// ```
pub fn init() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();
}
