//! Foundation crate shared by every other ssdlc crate.
//!
//! Holds the stage identifiers, the error taxonomy, exit codes, tracing setup
//! and the atomic write helper used by the persistence surface.

pub mod atomic_write;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod redaction;
pub mod types;
