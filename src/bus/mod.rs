//! The sync event bus: a FIFO queue drained by a single consumer thread that
//! hands every event to a priority-ordered chain of handlers.

pub mod handler;
pub mod manager;
pub mod priority;
pub mod queue;

// Re-exports
pub use handler::*;
pub use manager::*;
pub use queue::*;
