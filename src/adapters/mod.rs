//! Adapters implementing the core ports

pub mod memory;
