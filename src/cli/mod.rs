//! Command-line interface for ssdlc
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions (clap)
//! - `run`: entry point and command dispatch
//! - `commands`: command implementations
//! - `console`: shared stdin reader and the escalation prompt

pub mod args;
mod commands;
mod console;
mod run;


pub use args::{Cli, Commands, build_cli};
pub use console::{ConsoleEscalator, ConsoleInput};
pub use run::run;
