//! Common types and utilities shared across journal crates.
//!
//! Time units for entry timestamps and the process-wide machine/boot
//! identifiers used to scope journal queries.

pub mod system;
pub mod time;

pub use time::{Microseconds, Seconds, monotonic_now};

pub use system::{boot_id, format_id128, load_boot_id, load_machine_id, machine_id, random_id};
