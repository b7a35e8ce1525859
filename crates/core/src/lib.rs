//! docsync core - event model and ports
//!
//! This crate holds the event taxonomy that flows through the sync bus, the
//! transmission progress model, and the ports (traits) the sync client uses to
//! reach the remote repository, the metadata store and extended attributes.
//! It spawns no threads and does no I/O of its own.

pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for ergonomics
pub use domain::*;
pub use error::*;
