//! Tenant occupancy sync backend
//!
//! Acquires an authenticated session against the housing platform, extracts
//! the paginated guest list, mirrors it into a local snapshot store, and
//! reconciles the snapshot against long-lived student master records.

pub mod application;
pub mod domain;
pub mod infrastructure;
