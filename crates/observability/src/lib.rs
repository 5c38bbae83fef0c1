//! Process-wide tracing setup shared by the binaries.

/// Subscriber construction (filters, formats).
pub mod tracing;

/// Initialize JSON logging.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::Json);
}

/// Initialize human-readable logging.
pub fn init_pretty() {
    tracing::init(tracing::LogFormat::Pretty);
}
