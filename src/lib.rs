//! docsync: event coordination for a two-way folder sync client.
//!
//! Producers (the scheduler, the local watcher, login) put events on a
//! single-consumer bus. The consumer hands each event to a priority-ordered
//! chain of handlers that filter, enrich and finally act on it.

pub mod activity;
pub mod adapters;
pub mod bus;
pub mod cli;
pub mod config;
pub mod handlers;
pub mod repository;
pub mod watcher;
