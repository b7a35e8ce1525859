//! Busy/idle reporting and the registry of in-flight transfers.

pub mod aggregator;
pub mod transmissions;

// Re-exports
pub use aggregator::*;
pub use transmissions::*;
